use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use thiserror::Error;

/// LLM Provider类型
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub enum LLMProvider {
    #[serde(rename = "gemini")]
    #[default]
    Gemini,
    #[serde(rename = "openai")]
    OpenAI,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "deepseek")]
    DeepSeek,
    #[serde(rename = "openrouter")]
    OpenRouter,
    #[serde(rename = "ollama")]
    Ollama,
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::Gemini => write!(f, "gemini"),
            LLMProvider::OpenAI => write!(f, "openai"),
            LLMProvider::Anthropic => write!(f, "anthropic"),
            LLMProvider::DeepSeek => write!(f, "deepseek"),
            LLMProvider::OpenRouter => write!(f, "openrouter"),
            LLMProvider::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for LLMProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" => Ok(LLMProvider::Gemini),
            "openai" => Ok(LLMProvider::OpenAI),
            "anthropic" => Ok(LLMProvider::Anthropic),
            "deepseek" => Ok(LLMProvider::DeepSeek),
            "openrouter" => Ok(LLMProvider::OpenRouter),
            "ollama" => Ok(LLMProvider::Ollama),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// Fatal configuration problems. These are reported at startup and never retried.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("missing LLM API credential: environment variable `{0}` is not set")]
    MissingCredential(String),

    #[error("rate limit `{0}` must be greater than zero")]
    ZeroRateLimit(&'static str),

    #[error("unknown task type `{0}` in routing table")]
    UnknownTaskType(String),

    #[error("unknown logical model `{0}` in routing table")]
    UnknownModel(String),

    #[error("logical model `{0}` has no backend model registered")]
    UnregisteredModel(String),
}

/// 应用程序配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Config {
    /// 报告输出路径
    pub output_path: PathBuf,

    /// LLM模型配置
    pub llm: LLMConfig,

    /// 请求配额
    pub rate_limit: RateLimitConfig,

    /// 任务与模型的路由表
    pub routing: RoutingConfig,

    /// 知识库配置
    pub knowledge: KnowledgeConfig,

    /// 缓存配置
    pub cache: CacheConfig,

    /// 调研流程配置
    pub pipeline: PipelineConfig,

    /// HTTP服务配置
    pub server: ServerConfig,

    /// 是否启用详细日志
    pub verbose: bool,
}

/// LLM模型配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LLMConfig {
    /// LLM Provider类型
    pub provider: LLMProvider,

    /// LLM API KEY，未配置时从 `api_key_env` 指定的环境变量读取
    pub api_key: Option<String>,

    /// 存放API KEY的环境变量名
    pub api_key_env: String,

    /// LLM API基地址，为空时使用provider默认地址
    pub api_base_url: Option<String>,

    /// 最大tokens
    pub max_tokens: u32,

    /// 温度
    pub temperature: f64,

    /// 单个模型的最大尝试次数
    pub retry_attempts: u32,

    /// 指数退避的基础间隔（毫秒）
    pub retry_delay_ms: u64,

    /// 命中限流后的固定退避（毫秒）
    pub rate_limit_backoff_ms: u64,

    /// 批量调用时两个prompt之间的间隔（毫秒）
    pub batch_delay_ms: u64,

    /// 单次调用超时时间（秒）
    pub timeout_seconds: u64,
}

/// 请求配额
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub requests_per_day: u32,
}

/// 逻辑模型注册表、任务分配表与降级链
///
/// Keys are kept as plain strings here so a config file can be read without
/// knowing the closed set of names; `ModelManager::new` turns them into typed
/// tables and rejects anything it does not recognise.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RoutingConfig {
    /// logical model -> backend model id
    pub models: BTreeMap<String, String>,

    /// task type -> logical model
    pub task_models: BTreeMap<String, String>,

    /// logical model -> ordered alternatives
    pub fallback_chains: BTreeMap<String, Vec<String>>,

    /// 未知任务类型使用的模型
    pub default_model: String,

    /// 未配置降级链的模型使用的降级链
    pub default_fallback_chain: Vec<String>,
}

/// 知识库配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct KnowledgeConfig {
    pub enabled: bool,

    /// 知识库根目录，一级子目录名即文档类型
    pub path: PathBuf,

    /// 每次检索返回的最大片段数
    pub max_results: usize,

    /// 每个片段的最大字符数
    pub snippet_chars: usize,
}

/// 缓存配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    /// 是否启用缓存
    pub enabled: bool,

    /// 缓存目录
    pub cache_dir: PathBuf,

    /// 缓存过期时间（小时）
    pub expire_hours: u64,
}

/// 调研流程配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    /// 单次调研的最长执行时间（秒）
    pub max_execution_seconds: u64,
}

/// HTTP服务配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Config {
    /// 从文件加载配置
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let mut file =
            File::open(path).context(format!("Failed to open config file: {:?}", path))?;
        let mut content = String::new();
        file.read_to_string(&mut content)
            .context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }
}

impl LLMConfig {
    /// Resolves the credential, preferring an explicit key over the environment.
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        if let Some(key) = &self.api_key
            && !key.trim().is_empty()
        {
            return Ok(key.clone());
        }

        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(ConfigError::MissingCredential(self.api_key_env.clone())),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("./reports"),
            llm: LLMConfig::default(),
            rate_limit: RateLimitConfig::default(),
            routing: RoutingConfig::default(),
            knowledge: KnowledgeConfig::default(),
            cache: CacheConfig::default(),
            pipeline: PipelineConfig::default(),
            server: ServerConfig::default(),
            verbose: false,
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::default(),
            api_key: None,
            api_key_env: String::from("GEMINI_API_KEY"),
            api_base_url: None,
            max_tokens: 2048,
            temperature: 0.7,
            retry_attempts: 2,
            retry_delay_ms: 2000,
            rate_limit_backoff_ms: 30_000,
            batch_delay_ms: 1000,
            timeout_seconds: 120,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 15,
            requests_per_day: 1500,
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        let models = BTreeMap::from([
            ("fast".to_string(), "gemini-2.0-flash-lite".to_string()),
            ("creative".to_string(), "gemini-2.0-flash".to_string()),
            ("precise".to_string(), "gemini-2.5-flash".to_string()),
            ("fallback".to_string(), "gemini-1.5-flash".to_string()),
        ]);

        let task_models = BTreeMap::from([
            ("executive_summary".to_string(), "creative".to_string()),
            ("research_report".to_string(), "creative".to_string()),
            ("strategic_recommendations".to_string(), "creative".to_string()),
            ("swot_analysis".to_string(), "precise".to_string()),
            ("competitive_benchmarking".to_string(), "precise".to_string()),
            ("industry_analysis".to_string(), "precise".to_string()),
            ("company_research".to_string(), "precise".to_string()),
            ("data_collection".to_string(), "fast".to_string()),
            ("market_trends".to_string(), "fast".to_string()),
        ]);

        let fallback_chains = BTreeMap::from([
            (
                "creative".to_string(),
                vec!["precise".to_string(), "fast".to_string(), "fallback".to_string()],
            ),
            (
                "precise".to_string(),
                vec!["fast".to_string(), "fallback".to_string()],
            ),
            (
                "fast".to_string(),
                vec!["creative".to_string(), "fallback".to_string()],
            ),
            ("fallback".to_string(), vec!["fast".to_string()]),
        ]);

        Self {
            models,
            task_models,
            fallback_chains,
            default_model: String::from("fast"),
            default_fallback_chain: vec![String::from("fallback")],
        }
    }
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("./knowledge"),
            max_results: 3,
            snippet_chars: 800,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_dir: PathBuf::from(".marketresearch/cache"),
            expire_hours: 24,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_execution_seconds: 3600,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: String::from("127.0.0.1:8000"),
        }
    }
}

// Include tests
#[cfg(test)]
mod tests;
