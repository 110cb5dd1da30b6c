pub mod api;
pub mod cache;
pub mod chains;
pub mod cli;
pub mod config;
pub mod knowledge;
pub mod llm;
pub mod memory;
pub mod outlet;
pub mod prompts;
pub mod research;
pub mod service;
pub mod store;

pub use config::Config;
pub use research::{ResearchPipeline, ResearchRequest};
pub use service::ResearchService;
