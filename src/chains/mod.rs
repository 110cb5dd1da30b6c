//! 分析链 - prompt → LLM → 结构化输出

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::llm::{LlmError, TaskType};
use crate::prompts::{PromptCategory, PromptError};

mod factory;
pub mod outputs;
pub mod parser;

pub use factory::{Chain, ChainFactory, ChainResponse};
pub use outputs::*;

/// One structured-output pipeline per analysis task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainKind {
    DataCollection,
    CompanyResearch,
    IndustryAnalysis,
    SwotAnalysis,
    CompetitiveBenchmarking,
    MarketTrends,
    ExecutiveSummary,
    StrategicRecommendations,
    ResearchReport,
}

impl ChainKind {
    pub const ALL: [ChainKind; 9] = [
        ChainKind::DataCollection,
        ChainKind::CompanyResearch,
        ChainKind::IndustryAnalysis,
        ChainKind::SwotAnalysis,
        ChainKind::CompetitiveBenchmarking,
        ChainKind::MarketTrends,
        ChainKind::ExecutiveSummary,
        ChainKind::StrategicRecommendations,
        ChainKind::ResearchReport,
    ];

    pub fn task_type(&self) -> TaskType {
        match self {
            ChainKind::DataCollection => TaskType::DataCollection,
            ChainKind::CompanyResearch => TaskType::CompanyResearch,
            ChainKind::IndustryAnalysis => TaskType::IndustryAnalysis,
            ChainKind::SwotAnalysis => TaskType::SwotAnalysis,
            ChainKind::CompetitiveBenchmarking => TaskType::CompetitiveBenchmarking,
            ChainKind::MarketTrends => TaskType::MarketTrends,
            ChainKind::ExecutiveSummary => TaskType::ExecutiveSummary,
            ChainKind::StrategicRecommendations => TaskType::StrategicRecommendations,
            ChainKind::ResearchReport => TaskType::ResearchReport,
        }
    }

    pub fn prompt_category(&self) -> PromptCategory {
        match self {
            ChainKind::DataCollection | ChainKind::CompanyResearch | ChainKind::IndustryAnalysis => {
                PromptCategory::Research
            }
            ChainKind::SwotAnalysis
            | ChainKind::CompetitiveBenchmarking
            | ChainKind::MarketTrends => PromptCategory::Analysis,
            ChainKind::ExecutiveSummary
            | ChainKind::StrategicRecommendations
            | ChainKind::ResearchReport => PromptCategory::Reporting,
        }
    }

    /// Shares the task type's name, which is also the prompt template name.
    pub fn as_str(&self) -> &'static str {
        self.task_type().as_str()
    }
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChainKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| format!("Unknown chain type: {}", s))
    }
}

impl TryFrom<TaskType> for ChainKind {
    type Error = String;

    fn try_from(task_type: TaskType) -> Result<Self, Self::Error> {
        ChainKind::ALL
            .into_iter()
            .find(|kind| kind.task_type() == task_type)
            .ok_or_else(|| format!("No chain for task type {}", task_type))
    }
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("{kind} chain reply contains no JSON object")]
    MissingJson { kind: ChainKind },
    #[error("{kind} chain reply could not be parsed: {message}")]
    Parse { kind: ChainKind, message: String },
    #[error("{chain} chain cannot produce {requested} output")]
    KindMismatch {
        chain: ChainKind,
        requested: ChainKind,
    },
}

/// 链输入
///
/// `variables` feed the prompt template; `input` is the user message.
#[derive(Debug, Clone, Default)]
pub struct ChainInput {
    pub research_topic: String,
    pub current_date: String,
    pub variables: BTreeMap<String, String>,
    pub input: String,
}

impl ChainInput {
    pub fn new(research_topic: &str, input: impl Into<String>) -> Self {
        Self {
            research_topic: research_topic.to_string(),
            current_date: chrono::Local::now().format("%Y-%m-%d").to_string(),
            variables: BTreeMap::new(),
            input: input.into(),
        }
    }

    pub fn with_var(mut self, name: &str, value: impl Into<String>) -> Self {
        self.variables.insert(name.to_string(), value.into());
        self
    }

    pub fn with_date(mut self, current_date: &str) -> Self {
        self.current_date = current_date.to_string();
        self
    }

    /// Text used to look up knowledge snippets: topic plus company and industry names.
    pub fn knowledge_query(&self) -> String {
        let mut parts = vec![self.research_topic.as_str()];
        for key in ["company_name", "industry_name"] {
            if let Some(value) = self.variables.get(key) {
                parts.push(value.as_str());
            }
        }
        parts.join(" ")
    }
}
