//! 模型适配器 - 单个任务类型的模型选择、限流、重试与降级

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::LLMConfig;
use crate::llm::client::ModelBackend;
use crate::llm::error::{FailureKind, LlmError, ModelAttempt, ModelOutcome};
use crate::llm::model_manager::{LogicalModel, ModelManager, TaskType};
use crate::llm::rate_limiter::RateLimiter;

/// 重试策略
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per model before moving down the fallback chain.
    pub max_attempts: u32,
    /// Transient errors wait `base_delay * 2^(attempt - 1)`.
    pub base_delay: Duration,
    /// Fixed wait after a rate-limit error.
    pub rate_limit_backoff: Duration,
    /// Pause between prompts of a batch.
    pub batch_delay: Duration,
}

impl From<&LLMConfig> for RetryPolicy {
    fn from(config: &LLMConfig) -> Self {
        Self {
            max_attempts: config.retry_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_delay_ms),
            rate_limit_backoff: Duration::from_millis(config.rate_limit_backoff_ms),
            batch_delay: Duration::from_millis(config.batch_delay_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&LLMConfig::default())
    }
}

/// A successful call, with the record of every model tried on the way.
#[derive(Debug, Clone, Serialize)]
pub struct Invocation {
    pub task: TaskType,
    pub model: LogicalModel,
    pub text: String,
    pub attempts: Vec<ModelAttempt>,
}

impl Invocation {
    pub fn models_attempted(&self) -> Vec<LogicalModel> {
        self.attempts.iter().map(|attempt| attempt.model).collect()
    }
}

/// 基于模型管理器的LLM适配器，每个任务类型一个实例
#[derive(Clone)]
pub struct ModelBackedLlm {
    task_type: TaskType,
    primary_model: LogicalModel,
    manager: Arc<ModelManager>,
    limiter: Arc<RateLimiter>,
    backend: Arc<dyn ModelBackend>,
    policy: RetryPolicy,
}

impl ModelBackedLlm {
    pub fn new(
        task_type: TaskType,
        manager: Arc<ModelManager>,
        limiter: Arc<RateLimiter>,
        backend: Arc<dyn ModelBackend>,
        policy: RetryPolicy,
    ) -> Self {
        let primary_model = manager.get_model_for_task(task_type);
        Self {
            task_type,
            primary_model,
            manager,
            limiter,
            backend,
            policy,
        }
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    pub fn primary_model(&self) -> LogicalModel {
        self.primary_model
    }

    pub fn backend_model(&self) -> &str {
        self.manager
            .backend_model(self.primary_model)
            .unwrap_or_default()
    }

    pub async fn generate(&self, prompt: &str) -> Result<Invocation, LlmError> {
        self.generate_with_system("", prompt).await
    }

    /// 依次尝试主模型与其降级链，首个成功的结果直接返回
    pub async fn generate_with_system(
        &self,
        system_prompt: &str,
        prompt: &str,
    ) -> Result<Invocation, LlmError> {
        let candidates = std::iter::once(self.primary_model)
            .chain(self.manager.get_fallback_chain(self.primary_model));

        let mut visited = HashSet::new();
        let mut attempts = Vec::new();

        for model in candidates {
            if !visited.insert(model) {
                continue;
            }
            let Some(backend_model) = self.manager.backend_model(model) else {
                continue;
            };

            let (count, result) = self
                .call_with_retry(model, backend_model, system_prompt, prompt)
                .await;

            match result {
                Ok(text) => {
                    attempts.push(ModelAttempt {
                        model,
                        backend_model: backend_model.to_string(),
                        attempts: count,
                        outcome: ModelOutcome::Success,
                    });
                    return Ok(Invocation {
                        task: self.task_type,
                        model,
                        text,
                        attempts,
                    });
                }
                Err(outcome) => {
                    match &outcome {
                        ModelOutcome::RateLimited(_) => {
                            warn!("🚫 {} 模型持续限流，切换下一个模型", model)
                        }
                        _ => warn!("⚠️ {} 模型调用失败，切换下一个模型", model),
                    }
                    attempts.push(ModelAttempt {
                        model,
                        backend_model: backend_model.to_string(),
                        attempts: count,
                        outcome,
                    });
                }
            }
        }

        warn!("❌ All models failed for task {}", self.task_type);
        Err(LlmError::AllModelsFailed {
            task: self.task_type,
            attempts,
        })
    }

    /// 批量调用，严格串行并在两个prompt之间停顿
    pub async fn generate_batch(&self, prompts: &[String]) -> Vec<Result<Invocation, LlmError>> {
        let mut results = Vec::with_capacity(prompts.len());
        for (index, prompt) in prompts.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.policy.batch_delay).await;
            }
            results.push(self.generate(prompt).await);
        }
        results
    }

    /// Runs the per-model retry loop. Returns the number of calls made and
    /// either the reply text or the outcome that ended the loop.
    async fn call_with_retry(
        &self,
        model: LogicalModel,
        backend_model: &str,
        system_prompt: &str,
        prompt: &str,
    ) -> (u32, Result<String, ModelOutcome>) {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            self.limiter.acquire(model).await;
            attempt += 1;

            let error = match self
                .backend
                .complete(backend_model, system_prompt, prompt)
                .await
            {
                Ok(text) if !text.trim().is_empty() => {
                    info!(
                        "✅ [{}] {} ({}) 调用成功",
                        self.task_type, model, backend_model
                    );
                    return (attempt, Ok(text));
                }
                Ok(_) => String::from("backend returned an empty response"),
                Err(e) => format!("{:#}", e),
            };

            let kind = FailureKind::classify(&error);
            warn!(
                "❌ [{}] {} 第 {} / {} 次尝试失败: {}",
                self.task_type, model, attempt, max_attempts, error
            );

            if attempt >= max_attempts {
                let outcome = match kind {
                    FailureKind::RateLimit => ModelOutcome::RateLimited(error),
                    FailureKind::Transient => ModelOutcome::Failed(error),
                };
                return (attempt, Err(outcome));
            }

            let delay = match kind {
                FailureKind::RateLimit => self.policy.rate_limit_backoff,
                FailureKind::Transient => self
                    .policy
                    .base_delay
                    .saturating_mul(1 << (attempt - 1).min(16)),
            };
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RateLimitConfig, RoutingConfig};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[derive(Clone, Copy)]
    enum Behavior {
        Succeed,
        RateLimited,
        Broken,
        FailOnce,
        Empty,
    }

    struct ScriptedBackend {
        behaviors: HashMap<String, Behavior>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn new(behaviors: &[(&str, Behavior)]) -> Arc<Self> {
            Arc::new(Self {
                behaviors: behaviors
                    .iter()
                    .map(|(model, behavior)| (model.to_string(), *behavior))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModelBackend for ScriptedBackend {
        async fn complete(
            &self,
            backend_model: &str,
            _system_prompt: &str,
            prompt: &str,
        ) -> anyhow::Result<String> {
            let previous_calls = {
                let mut calls = self.calls.lock().unwrap();
                let previous = calls.iter().filter(|c| *c == backend_model).count();
                calls.push(backend_model.to_string());
                previous
            };
            match self.behaviors.get(backend_model).copied() {
                Some(Behavior::Succeed) => Ok(format!("{} says: {}", backend_model, prompt)),
                Some(Behavior::RateLimited) => Err(anyhow!("429 RESOURCE_EXHAUSTED: quota exceeded")),
                Some(Behavior::FailOnce) if previous_calls == 0 => Err(anyhow!("connection reset")),
                Some(Behavior::FailOnce) => Ok(format!("{} recovered", backend_model)),
                Some(Behavior::Empty) => Ok(String::from("   ")),
                Some(Behavior::Broken) | None => Err(anyhow!("internal server error")),
            }
        }
    }

    fn manager(chains: &[(&str, &[&str])]) -> Arc<ModelManager> {
        let routing = RoutingConfig {
            models: LogicalModel::ALL
                .iter()
                .map(|m| (m.to_string(), m.to_string()))
                .collect(),
            task_models: BTreeMap::from([("swot_analysis".to_string(), "precise".to_string())]),
            fallback_chains: chains
                .iter()
                .map(|(m, chain)| (m.to_string(), chain.iter().map(|c| c.to_string()).collect()))
                .collect(),
            default_model: "fast".to_string(),
            default_fallback_chain: vec![],
        };
        Arc::new(ModelManager::new(&routing, "test-key").unwrap())
    }

    fn limiter(requests_per_minute: u32) -> Arc<RateLimiter> {
        Arc::new(
            RateLimiter::new(&RateLimitConfig {
                requests_per_minute,
                requests_per_day: 10_000,
            })
            .unwrap(),
        )
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_secs(2),
            rate_limit_backoff: Duration::from_secs(30),
            batch_delay: Duration::from_secs(1),
        }
    }

    fn adapter(
        chains: &[(&str, &[&str])],
        backend: Arc<ScriptedBackend>,
        limiter: Arc<RateLimiter>,
        policy: RetryPolicy,
    ) -> ModelBackedLlm {
        ModelBackedLlm::new(
            TaskType::SwotAnalysis,
            manager(chains),
            limiter,
            backend,
            policy,
        )
    }

    #[test]
    fn test_swot_adapter_primary_is_precise() {
        let llm = adapter(
            &[("precise", &["fast", "fallback"])],
            ScriptedBackend::new(&[]),
            limiter(10),
            policy(),
        );
        assert_eq!(llm.primary_model(), LogicalModel::Precise);
        assert_eq!(llm.backend_model(), "precise");
    }

    #[tokio::test(start_paused = true)]
    async fn test_primary_success_short_circuits() {
        let backend = ScriptedBackend::new(&[("precise", Behavior::Succeed)]);
        let limiter = limiter(10);
        let llm = adapter(
            &[("precise", &["fast", "fallback"])],
            backend.clone(),
            limiter.clone(),
            policy(),
        );

        let invocation = llm.generate("hello").await.unwrap();

        assert_eq!(invocation.model, LogicalModel::Precise);
        assert_eq!(invocation.text, "precise says: hello");
        assert_eq!(invocation.models_attempted(), vec![LogicalModel::Precise]);
        assert_eq!(backend.calls(), vec!["precise"]);
        assert_eq!(limiter.usage_for(LogicalModel::Precise), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_is_retried_on_same_model() {
        let backend = ScriptedBackend::new(&[("precise", Behavior::FailOnce)]);
        let llm = adapter(&[("precise", &["fast"])], backend.clone(), limiter(10), policy());

        let start = Instant::now();
        let invocation = llm.generate("hello").await.unwrap();

        assert_eq!(invocation.model, LogicalModel::Precise);
        assert_eq!(invocation.attempts[0].attempts, 2);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
        assert_eq!(backend.calls(), vec!["precise", "precise"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_chain_reaches_kth_model() {
        let backend = ScriptedBackend::new(&[
            ("precise", Behavior::RateLimited),
            ("fast", Behavior::RateLimited),
            ("fallback", Behavior::Succeed),
        ]);
        let limiter = limiter(100);
        let llm = adapter(
            &[("precise", &["fast", "fallback"])],
            backend.clone(),
            limiter.clone(),
            policy(),
        );

        let invocation = llm.generate("hello").await.unwrap();

        assert_eq!(invocation.model, LogicalModel::Fallback);
        assert_eq!(invocation.text, "fallback says: hello");
        assert_eq!(
            invocation.models_attempted(),
            vec![
                LogicalModel::Precise,
                LogicalModel::Fast,
                LogicalModel::Fallback
            ]
        );
        assert!(matches!(
            invocation.attempts[0].outcome,
            ModelOutcome::RateLimited(_)
        ));
        // every call counts against the quota, failed ones included
        assert_eq!(limiter.usage_for(LogicalModel::Precise), 2);
        assert_eq!(limiter.usage_for(LogicalModel::Fast), 2);
        assert_eq!(limiter.usage_for(LogicalModel::Fallback), 1);
        assert_eq!(backend.calls().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_uses_fixed_backoff() {
        let backend = ScriptedBackend::new(&[("precise", Behavior::RateLimited)]);
        let llm = adapter(&[("precise", &[])], backend, limiter(100), policy());

        let start = Instant::now();
        let result = llm.generate("hello").await;

        assert!(result.is_err());
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_backoff_is_exponential() {
        let backend = ScriptedBackend::new(&[("precise", Behavior::Broken)]);
        let policy = RetryPolicy {
            max_attempts: 4,
            ..policy()
        };
        let llm = adapter(&[("precise", &[])], backend.clone(), limiter(100), policy);

        let start = Instant::now();
        let result = llm.generate("hello").await;

        assert!(result.is_err());
        // 2s + 4s + 8s between four attempts
        assert_eq!(start.elapsed(), Duration::from_secs(14));
        assert_eq!(backend.calls().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_is_tagged_and_lists_every_model() {
        let backend = ScriptedBackend::new(&[
            ("precise", Behavior::Broken),
            ("fast", Behavior::RateLimited),
            ("fallback", Behavior::Empty),
        ]);
        let llm = adapter(
            &[("precise", &["fast", "fallback"])],
            backend,
            limiter(100),
            policy(),
        );

        let error = llm.generate("hello").await.unwrap_err();

        assert_eq!(error.to_string(), "All models failed for task swot_analysis");
        let attempts = error.attempts();
        assert_eq!(attempts.len(), 3);
        assert!(matches!(attempts[0].outcome, ModelOutcome::Failed(_)));
        assert!(matches!(attempts[1].outcome, ModelOutcome::RateLimited(_)));
        assert!(matches!(attempts[2].outcome, ModelOutcome::Failed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cyclic_chain_tries_each_model_once() {
        let backend = ScriptedBackend::new(&[]);
        let llm = adapter(
            &[
                ("precise", &["fast", "precise", "fast", "creative"]),
                ("fast", &["precise"]),
            ],
            backend.clone(),
            limiter(100),
            RetryPolicy {
                max_attempts: 1,
                ..policy()
            },
        );

        let error = llm.generate("hello").await.unwrap_err();

        let models: Vec<_> = error.attempts().iter().map(|a| a.model).collect();
        assert_eq!(
            models,
            vec![
                LogicalModel::Precise,
                LogicalModel::Fast,
                LogicalModel::Creative
            ]
        );
        assert_eq!(backend.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_wait_for_rate_limiter() {
        let backend = ScriptedBackend::new(&[("precise", Behavior::Succeed)]);
        let llm = adapter(&[("precise", &[])], backend, limiter(1), policy());

        let start = Instant::now();
        llm.generate("first").await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);

        llm.generate("second").await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_is_sequential_with_delay() {
        let backend = ScriptedBackend::new(&[("precise", Behavior::Succeed)]);
        let llm = adapter(&[("precise", &[])], backend.clone(), limiter(100), policy());
        let prompts = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let start = Instant::now();
        let results = llm.generate_batch(&prompts).await;

        assert_eq!(start.elapsed(), Duration::from_secs(2));
        let texts: Vec<_> = results
            .into_iter()
            .map(|r| r.unwrap().text)
            .collect();
        assert_eq!(
            texts,
            vec!["precise says: a", "precise says: b", "precise says: c"]
        );
    }
}
