use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error, info};

use super::parser::{format_instructions, parse_output};
use super::{ChainError, ChainInput, ChainKind, ChainOutput};
use crate::knowledge::ContextRetriever;
use crate::llm::{Invocation, LLMClient, ModelBackedLlm};
use crate::prompts::PromptRegistry;

/// Parsed chain output plus the invocation record that produced it.
#[derive(Debug, Clone)]
pub struct ChainResponse<T> {
    pub output: T,
    pub invocation: Invocation,
}

/// 分析链，绑定到其任务类型的LLM适配器
#[derive(Clone)]
pub struct Chain {
    kind: ChainKind,
    llm: ModelBackedLlm,
    registry: Arc<PromptRegistry>,
}

impl Chain {
    pub fn kind(&self) -> ChainKind {
        self.kind
    }

    pub fn llm(&self) -> &ModelBackedLlm {
        &self.llm
    }

    pub async fn invoke<T: ChainOutput>(
        &self,
        input: &ChainInput,
    ) -> Result<ChainResponse<T>, ChainError> {
        if T::KIND != self.kind {
            return Err(ChainError::KindMismatch {
                chain: self.kind,
                requested: T::KIND,
            });
        }

        let mut variables = input.variables.clone();
        variables.insert("research_topic".into(), input.research_topic.clone());
        variables.insert("current_date".into(), input.current_date.clone());
        variables.insert("format_instructions".into(), format_instructions::<T>());

        let system_prompt = self.registry.render(
            self.kind.prompt_category(),
            self.kind.as_str(),
            &variables,
        )?;

        let invocation = self
            .llm
            .generate_with_system(&system_prompt, &input.input)
            .await?;

        match parse_output::<T>(&invocation.text) {
            Ok(output) => {
                info!("✅ {} 链执行成功 (模型: {})", self.kind, invocation.model);
                Ok(ChainResponse { output, invocation })
            }
            Err(e) => {
                error!("❌ {} 链输出解析失败: {}", self.kind, e);
                Err(e)
            }
        }
    }
}

/// 分析链工厂
///
/// Chains are built on first use and cached; every chain of the same task
/// type shares one adapter, and all adapters share the client's limiter.
pub struct ChainFactory {
    client: LLMClient,
    registry: Arc<PromptRegistry>,
    retriever: Option<Arc<dyn ContextRetriever>>,
    chains: Mutex<HashMap<ChainKind, Chain>>,
}

impl ChainFactory {
    pub fn new(client: LLMClient, retriever: Option<Arc<dyn ContextRetriever>>) -> Self {
        Self {
            client,
            registry: Arc::new(PromptRegistry::new()),
            retriever,
            chains: Mutex::new(HashMap::new()),
        }
    }

    pub fn client(&self) -> &LLMClient {
        &self.client
    }

    pub fn get_chain(&self, kind: ChainKind) -> Chain {
        let mut chains = self.chains.lock().unwrap_or_else(PoisonError::into_inner);
        chains
            .entry(kind)
            .or_insert_with(|| {
                debug!("创建分析链: {}", kind);
                Chain {
                    kind,
                    llm: self.client.for_task(kind.task_type()),
                    registry: self.registry.clone(),
                }
            })
            .clone()
    }

    pub fn cached_chains(&self) -> Vec<ChainKind> {
        let chains = self.chains.lock().unwrap_or_else(PoisonError::into_inner);
        let mut kinds: Vec<_> = chains.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// 执行分析链，若配置了知识库则先补充上下文
    pub async fn execute<T: ChainOutput>(
        &self,
        mut input: ChainInput,
    ) -> Result<ChainResponse<T>, ChainError> {
        if let Some(retriever) = &self.retriever {
            if let Some(context) = retriever.retrieve(T::KIND, &input.knowledge_query()) {
                debug!("📚 {} 链使用知识库上下文", T::KIND);
                input.input = format!(
                    "Based on the following knowledge base context:\n\n{}\n\n{}",
                    context, input.input
                );
            }
        }

        self.get_chain(T::KIND).invoke::<T>(&input).await
    }
}
