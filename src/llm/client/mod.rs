//! LLM客户端 - 提供统一的LLM服务接口

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tracing::{error, info};

use crate::config::{Config, LLMConfig};
use crate::llm::adapter::{ModelBackedLlm, RetryPolicy};
use crate::llm::model_manager::{ModelManager, TaskType};
use crate::llm::rate_limiter::RateLimiter;

mod providers;

use providers::ProviderClient;

/// A concrete text-generation backend, addressed by backend model id.
///
/// Errors are returned as-is; the adapter decides retry and fallback by
/// inspecting the error text.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn complete(
        &self,
        backend_model: &str,
        system_prompt: &str,
        prompt: &str,
    ) -> Result<String>;
}

/// rig-core 驱动的后端实现
pub struct RigBackend {
    client: ProviderClient,
    config: LLMConfig,
}

impl RigBackend {
    pub fn new(config: &LLMConfig, api_key: &str) -> Result<Self> {
        let client = ProviderClient::new(config, api_key)?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl ModelBackend for RigBackend {
    async fn complete(
        &self,
        backend_model: &str,
        system_prompt: &str,
        prompt: &str,
    ) -> Result<String> {
        let agent = self
            .client
            .create_agent(backend_model, system_prompt, &self.config)?;
        let timeout = Duration::from_secs(self.config.timeout_seconds);

        match tokio::time::timeout(timeout, agent.prompt(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "request to {} timed out after {}s",
                backend_model,
                self.config.timeout_seconds
            )),
        }
    }
}

/// LLM客户端 - 进程内共享的模型管理器、限流器与后端
///
/// Cloning is cheap; every clone shares the same limiter state.
#[derive(Clone)]
pub struct LLMClient {
    manager: Arc<ModelManager>,
    limiter: Arc<RateLimiter>,
    backend: Arc<dyn ModelBackend>,
    policy: RetryPolicy,
}

impl LLMClient {
    /// 创建新的LLM客户端，缺少凭据或配额为0时直接失败
    pub fn new(config: &Config) -> Result<Self> {
        let manager = ModelManager::from_env(&config.routing, &config.llm)?;
        let limiter = RateLimiter::new(&config.rate_limit)?;
        let backend = RigBackend::new(&config.llm, manager.api_key())?;

        Ok(Self::with_parts(
            Arc::new(manager),
            Arc::new(limiter),
            Arc::new(backend),
            RetryPolicy::from(&config.llm),
        ))
    }

    pub fn with_parts(
        manager: Arc<ModelManager>,
        limiter: Arc<RateLimiter>,
        backend: Arc<dyn ModelBackend>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            manager,
            limiter,
            backend,
            policy,
        }
    }

    /// 为指定任务类型创建LLM适配器
    pub fn for_task(&self, task_type: TaskType) -> ModelBackedLlm {
        ModelBackedLlm::new(
            task_type,
            self.manager.clone(),
            self.limiter.clone(),
            self.backend.clone(),
            self.policy.clone(),
        )
    }

    pub fn model_manager(&self) -> &Arc<ModelManager> {
        &self.manager
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// 检查模型连接和功能是否正常
    pub async fn check_connection(&self) -> Result<()> {
        info!("🔄 正在检查模型连接...");
        match self
            .for_task(TaskType::General)
            .generate_with_system("You are a helpful assistant.", "Hello")
            .await
        {
            Ok(invocation) => {
                info!("✅ 模型连接正常 ({})", invocation.model);
                Ok(())
            }
            Err(e) => {
                error!("❌ 模型连接失败: {}", e);
                Err(e.into())
            }
        }
    }
}
