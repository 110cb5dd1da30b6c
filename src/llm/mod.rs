pub mod adapter;
pub mod client;
pub mod error;
pub mod model_manager;
pub mod rate_limiter;

pub use adapter::{Invocation, ModelBackedLlm, RetryPolicy};
pub use client::{LLMClient, ModelBackend};
pub use error::{LlmError, ModelAttempt, ModelOutcome};
pub use model_manager::{LogicalModel, ModelManager, TaskType};
pub use rate_limiter::{RateLimiter, UsageSnapshot};
