//! 研究服务 - 创建研究记录并在后台执行流水线

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use anyhow::Result;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::Config;
use crate::knowledge::{
    self, ContextRetriever, KnowledgeBase, KnowledgeError, KnowledgeFileList, KnowledgeStats,
    UploadedFile,
};
use crate::llm::{LLMClient, UsageSnapshot};
use crate::research::{
    PipelineObserver, PipelineResult, ResearchPipeline, ResearchRequest, TaskDefinition,
};
use crate::store::{ResearchRecord, ResearchStore};

/// Mirrors pipeline progress into the store record of one run.
struct StoreObserver {
    store: Arc<ResearchStore>,
    research_id: String,
}

impl PipelineObserver for StoreObserver {
    fn task_started(&self, task: &TaskDefinition) {
        self.store.task_started(&self.research_id, task.name);
    }

    fn task_completed(&self, task: &TaskDefinition, output: &str) {
        self.store
            .task_completed(&self.research_id, task.name, output);
    }

    fn task_failed(&self, task: &TaskDefinition, _error: &str) {
        self.store.task_failed(&self.research_id, task.name);
    }
}

/// 研究服务
///
/// Cloning shares the store, the pipeline and therefore the rate limiter.
#[derive(Clone)]
pub struct ResearchService {
    store: Arc<ResearchStore>,
    pipeline: Arc<ResearchPipeline>,
    client: LLMClient,
    knowledge: Option<Arc<RwLock<KnowledgeBase>>>,
}

impl ResearchService {
    pub fn new(config: &Config, client: LLMClient, knowledge: Option<KnowledgeBase>) -> Self {
        let knowledge = knowledge.map(|kb| Arc::new(RwLock::new(kb)));
        let retriever = knowledge
            .clone()
            .map(|kb| kb as Arc<dyn ContextRetriever>);
        let pipeline = ResearchPipeline::new(config, client.clone(), retriever);

        Self {
            store: Arc::new(ResearchStore::new()),
            pipeline: Arc::new(pipeline),
            client,
            knowledge,
        }
    }

    /// 根据配置创建服务，凭据缺失时失败
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = LLMClient::new(config)?;
        let knowledge = if config.knowledge.enabled {
            Some(KnowledgeBase::load(&config.knowledge)?)
        } else {
            info!("📚 知识库已禁用");
            None
        };
        Ok(Self::new(config, client, knowledge))
    }

    pub fn store(&self) -> &Arc<ResearchStore> {
        &self.store
    }

    fn knowledge(&self) -> Result<RwLockReadGuard<'_, KnowledgeBase>, KnowledgeError> {
        let knowledge = self.knowledge.as_ref().ok_or(KnowledgeError::Disabled)?;
        Ok(knowledge.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn knowledge_root(&self) -> Result<PathBuf, KnowledgeError> {
        Ok(self.knowledge()?.root().to_path_buf())
    }

    pub fn knowledge_stats(&self) -> Option<KnowledgeStats> {
        self.knowledge().ok().map(|kb| kb.stats())
    }

    /// 重新加载知识库，进行中的研究在下一次检索时看到新内容
    pub fn reindex_knowledge(&self) -> Result<KnowledgeStats, KnowledgeError> {
        let config = self.knowledge()?.config();
        let reloaded = KnowledgeBase::load(&config)
            .map_err(|e| KnowledgeError::Reindex(format!("{:#}", e)))?;
        let stats = reloaded.stats();

        if let Some(knowledge) = &self.knowledge {
            *knowledge.write().unwrap_or_else(PoisonError::into_inner) = reloaded;
        }
        info!("🔄 知识库已重建索引: {} 篇文档", stats.total_documents);
        Ok(stats)
    }

    pub fn knowledge_files(&self) -> Result<KnowledgeFileList, KnowledgeError> {
        knowledge::list_files(&self.knowledge_root()?)
    }

    /// Stores an uploaded file and reindexes when the file is indexable.
    pub async fn upload_knowledge(
        &self,
        filename: &str,
        category: Option<&str>,
        content: &[u8],
    ) -> Result<UploadedFile, KnowledgeError> {
        let root = self.knowledge_root()?;
        let mut uploaded = knowledge::upload_file(&root, filename, category, content).await?;
        if uploaded.indexable {
            self.reindex_knowledge()?;
            uploaded.processed = true;
        }
        Ok(uploaded)
    }

    /// Deletes a knowledge file; `false` when no file has that name.
    pub fn delete_knowledge_file(&self, filename: &str) -> Result<bool, KnowledgeError> {
        let deleted = knowledge::delete_file(&self.knowledge_root()?, filename)?;
        if deleted {
            self.reindex_knowledge()?;
        }
        Ok(deleted)
    }

    pub async fn check_connection(&self) -> Result<()> {
        self.client.check_connection().await
    }

    pub fn usage(&self) -> UsageSnapshot {
        self.client.rate_limiter().usage_snapshot()
    }

    pub fn client(&self) -> &LLMClient {
        &self.client
    }

    /// 启动一次后台研究，立即返回待执行的记录
    pub fn start(&self, request: ResearchRequest) -> ResearchRecord {
        let research_id = Uuid::new_v4().to_string();
        let record = self.store.create(&research_id, request.clone());
        info!("🆕 创建研究任务: {} ({})", research_id, request.research_topic);

        let service = self.clone();
        tokio::spawn(async move {
            // 错误已记录在研究记录中
            let _ = service.execute(&research_id, &request).await;
        });

        record
    }

    /// Runs a research to completion in the caller's task.
    pub async fn run(&self, request: ResearchRequest) -> Result<PipelineResult> {
        let research_id = Uuid::new_v4().to_string();
        self.store.create(&research_id, request.clone());
        self.execute(&research_id, &request).await
    }

    async fn execute(&self, research_id: &str, request: &ResearchRequest) -> Result<PipelineResult> {
        self.store.mark_running(research_id);
        let observer = StoreObserver {
            store: self.store.clone(),
            research_id: research_id.to_string(),
        };

        match self.pipeline.run(research_id, request, &observer).await {
            Ok(result) => {
                self.store.complete(
                    research_id,
                    result.report.clone(),
                    result.report_path.clone(),
                );
                Ok(result)
            }
            Err(e) => {
                let message = format!("{:#}", e);
                error!("❌ 研究失败: {} - {}", research_id, message);
                self.store.fail(research_id, message);
                Err(e)
            }
        }
    }
}
