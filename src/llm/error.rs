use serde::Serialize;
use thiserror::Error;

use crate::llm::model_manager::{LogicalModel, TaskType};

/// Substrings that mark a backend error as quota/backoff related.
const RATE_LIMIT_MARKERS: [&str; 8] = [
    "429",
    "quota",
    "rate limit",
    "rate_limit",
    "ratelimit",
    "resource exhausted",
    "resource_exhausted",
    "too many requests",
];

/// Backend failure class, decided from the error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimit,
    Transient,
}

impl FailureKind {
    pub fn classify(message: &str) -> Self {
        let message = message.to_lowercase();
        if RATE_LIMIT_MARKERS
            .iter()
            .any(|marker| message.contains(marker))
        {
            FailureKind::RateLimit
        } else {
            FailureKind::Transient
        }
    }
}

/// Final state of one model within an invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum ModelOutcome {
    Success,
    RateLimited(String),
    Failed(String),
}

/// What happened to one logical model during an invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelAttempt {
    pub model: LogicalModel,
    pub backend_model: String,
    pub attempts: u32,
    pub outcome: ModelOutcome,
}

#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// Every model in the fallback chain was tried and failed.
    #[error("All models failed for task {task}")]
    AllModelsFailed {
        task: TaskType,
        attempts: Vec<ModelAttempt>,
    },
}

impl LlmError {
    pub fn attempts(&self) -> &[ModelAttempt] {
        match self {
            LlmError::AllModelsFailed { attempts, .. } => attempts,
        }
    }
}
