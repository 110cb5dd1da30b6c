use crate::config::{Config, LLMProvider};
use crate::research::ResearchRequest;
use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

const DEFAULT_CONFIG_FILE: &str = "marketresearch.toml";

/// MarketResearch-RS - 多模型路由与限流的市场研究引擎
#[derive(Parser, Debug)]
#[command(name = "marketresearch-rs")]
#[command(
    about = "Multi-agent market research engine. Routes each research task to a suitable LLM under shared request quotas and writes a Markdown research report."
)]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// 配置文件路径
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// 报告输出路径
    #[arg(short, long, global = true)]
    pub output_path: Option<PathBuf>,

    /// 是否启用详细日志
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// LLM Provider (gemini, openai, anthropic, deepseek, openrouter, ollama)
    #[arg(long, global = true)]
    pub llm_provider: Option<String>,

    /// LLM API基地址
    #[arg(long, global = true)]
    pub llm_api_base_url: Option<String>,

    /// LLM API KEY
    #[arg(long, global = true)]
    pub llm_api_key: Option<String>,

    /// 最大tokens数
    #[arg(long, global = true)]
    pub max_tokens: Option<u32>,

    /// 温度参数
    #[arg(long, global = true)]
    pub temperature: Option<f64>,

    /// 每分钟请求上限
    #[arg(long, global = true)]
    pub requests_per_minute: Option<u32>,

    /// 每日请求上限
    #[arg(long, global = true)]
    pub requests_per_day: Option<u32>,

    /// 知识库目录
    #[arg(long, global = true)]
    pub knowledge_path: Option<PathBuf>,

    /// 是否禁用知识库
    #[arg(long, global = true)]
    pub no_knowledge: bool,

    /// 是否禁用缓存
    #[arg(long, global = true)]
    pub no_cache: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// 执行一次研究并将报告写入输出目录
    Run {
        /// 研究主题
        #[arg(short, long)]
        topic: String,

        /// 研究需求描述
        #[arg(short, long)]
        request: String,

        /// 目标公司
        #[arg(long)]
        company: Option<String>,

        /// 所属行业，默认与主题相同
        #[arg(long)]
        industry: Option<String>,
    },

    /// 启动HTTP服务
    Serve {
        /// 监听地址
        #[arg(short, long)]
        bind: Option<String>,
    },
}

impl Args {
    /// 将CLI参数转换为配置
    ///
    /// An explicit `--config` must be readable. Without it, `marketresearch.toml`
    /// in the working directory is used when present.
    pub fn to_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(config_path) => Config::from_file(config_path)?,
            None => {
                let default_config_path = std::env::current_dir()
                    .unwrap_or_else(|_| PathBuf::from("."))
                    .join(DEFAULT_CONFIG_FILE);

                if default_config_path.exists() {
                    Config::from_file(&default_config_path)?
                } else {
                    Config::default()
                }
            }
        };

        if let Some(output_path) = &self.output_path {
            config.output_path = output_path.clone();
        }

        // 覆盖LLM配置
        if let Some(provider_str) = &self.llm_provider {
            config.llm.provider = provider_str
                .parse::<LLMProvider>()
                .map_err(|e| anyhow!(e))?;
        }
        if let Some(llm_api_base_url) = &self.llm_api_base_url {
            config.llm.api_base_url = Some(llm_api_base_url.clone());
        }
        if let Some(llm_api_key) = &self.llm_api_key {
            config.llm.api_key = Some(llm_api_key.clone());
        }
        if let Some(max_tokens) = self.max_tokens {
            config.llm.max_tokens = max_tokens;
        }
        if let Some(temperature) = self.temperature {
            config.llm.temperature = temperature;
        }

        if let Some(rpm) = self.requests_per_minute {
            config.rate_limit.requests_per_minute = rpm;
        }
        if let Some(rpd) = self.requests_per_day {
            config.rate_limit.requests_per_day = rpd;
        }

        if let Some(knowledge_path) = &self.knowledge_path {
            config.knowledge.path = knowledge_path.clone();
        }
        if self.no_knowledge {
            config.knowledge.enabled = false;
        }
        if self.no_cache {
            config.cache.enabled = false;
        }

        if let Command::Serve {
            bind: Some(bind), ..
        } = &self.command
        {
            config.server.bind = bind.clone();
        }

        config.verbose = config.verbose || self.verbose;

        Ok(config)
    }

    /// The research to run for the `run` subcommand.
    pub fn research_request(&self) -> Option<ResearchRequest> {
        match &self.command {
            Command::Run {
                topic,
                request,
                company,
                industry,
            } => {
                let mut research = ResearchRequest::new(topic, request);
                research.company_name = company.clone();
                research.industry_name = industry.clone();
                Some(research)
            }
            Command::Serve { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests;
