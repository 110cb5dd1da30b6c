pub mod agents;
pub mod pipeline;
pub mod report;

pub use agents::{AgentRole, ResearchAgent};
pub use pipeline::{
    ANALYSIS_TASK, DATA_COLLECTION_TASK, NoopObserver, PipelineObserver, PipelineResult,
    REPORT_TASK, ResearchPipeline, ResearchRequest, TASKS, TaskDefinition, TaskOutput,
};
pub use report::{ReportSections, render_report};
