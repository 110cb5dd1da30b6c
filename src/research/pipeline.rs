//! 研究流水线 - 数据收集 → 分析 → 报告，三个任务严格串行

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::agents::{AgentRole, ResearchAgent};
use super::report::{ReportSections, render_report};
use crate::cache::ResearchCache;
use crate::chains::{
    ChainFactory, ChainInput, ChainKind, ChainOutput, CollectedData, CompanyResearch,
    CompetitiveBenchmarking, ExecutiveSummary, IndustryAnalysis, MarketTrends, ResearchReport,
    StrategicRecommendations, SwotAnalysis,
};
use crate::config::Config;
use crate::knowledge::ContextRetriever;
use crate::llm::LLMClient;
use crate::memory::ResearchMemory;
use crate::outlet::{DiskOutlet, Outlet};

pub const DATA_COLLECTION_TASK: &str = "comprehensive_data_collection_task";
pub const ANALYSIS_TASK: &str = "comprehensive_analysis_task";
pub const REPORT_TASK: &str = "final_comprehensive_report_task";

/// 研究请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub research_topic: String,
    pub research_request: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
    /// Adds a company profile to the data collection step
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub industry_name: Option<String>,
}

fn default_user_id() -> String {
    String::from("default")
}

impl ResearchRequest {
    pub fn new(research_topic: &str, research_request: &str) -> Self {
        Self {
            research_topic: research_topic.to_string(),
            research_request: research_request.to_string(),
            user_id: default_user_id(),
            company_name: None,
            industry_name: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskStep {
    DataCollection,
    Analysis,
    Report,
}

/// 流水线任务定义
#[derive(Debug, Clone, Copy)]
pub struct TaskDefinition {
    pub name: &'static str,
    pub agent: AgentRole,
    /// Chains the task may run, in order
    pub chains: &'static [ChainKind],
    step: TaskStep,
}

pub const TASKS: [TaskDefinition; 3] = [
    TaskDefinition {
        name: DATA_COLLECTION_TASK,
        agent: AgentRole::DigitalIntelligenceGatherer,
        chains: &[
            ChainKind::DataCollection,
            ChainKind::CompanyResearch,
            ChainKind::IndustryAnalysis,
            ChainKind::MarketTrends,
        ],
        step: TaskStep::DataCollection,
    },
    TaskDefinition {
        name: ANALYSIS_TASK,
        agent: AgentRole::QuantitativeInsightsSpecialist,
        chains: &[ChainKind::SwotAnalysis, ChainKind::CompetitiveBenchmarking],
        step: TaskStep::Analysis,
    },
    TaskDefinition {
        name: REPORT_TASK,
        agent: AgentRole::StrategicCommunicationsExpert,
        chains: &[
            ChainKind::ExecutiveSummary,
            ChainKind::StrategicRecommendations,
            ChainKind::ResearchReport,
        ],
        step: TaskStep::Report,
    },
];

/// 任务输出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutput {
    pub task_name: String,
    pub agent: AgentRole,
    pub output: String,
}

/// What the cache keeps for a `(topic, request)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ResearchOutcome {
    report: String,
    tasks: Vec<TaskOutput>,
}

#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub research_id: String,
    pub report: String,
    pub report_path: PathBuf,
    pub tasks: Vec<TaskOutput>,
    pub from_cache: bool,
}

/// Progress callbacks. Called on the pipeline's task, so keep them short.
pub trait PipelineObserver: Send + Sync {
    fn task_started(&self, _task: &TaskDefinition) {}
    fn task_completed(&self, _task: &TaskDefinition, _output: &str) {}
    fn task_failed(&self, _task: &TaskDefinition, _error: &str) {}
}

pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

/// 研究流水线
pub struct ResearchPipeline {
    factory: ChainFactory,
    agents: HashMap<AgentRole, ResearchAgent>,
    cache: ResearchCache,
    outlet: DiskOutlet,
    max_execution: Duration,
}

impl ResearchPipeline {
    pub fn new(
        config: &Config,
        client: LLMClient,
        retriever: Option<Arc<dyn ContextRetriever>>,
    ) -> Self {
        let agents = AgentRole::ALL
            .into_iter()
            .map(|role| (role, ResearchAgent::new(role, &client)))
            .collect();

        Self {
            factory: ChainFactory::new(client, retriever),
            agents,
            cache: ResearchCache::new(config.cache.clone()),
            outlet: DiskOutlet::new(&config.output_path),
            max_execution: Duration::from_secs(config.pipeline.max_execution_seconds),
        }
    }

    pub fn factory(&self) -> &ChainFactory {
        &self.factory
    }

    pub fn agent(&self, role: AgentRole) -> Result<&ResearchAgent> {
        self.agents
            .get(&role)
            .ok_or_else(|| anyhow!("Agent {} is not configured", role))
    }

    /// Logs which backend model each agent's own calls start on.
    pub fn log_agent_models(&self) {
        info!("🤖 智能体模型分配:");
        for role in AgentRole::ALL {
            if let Some(agent) = self.agents.get(&role) {
                info!(
                    "   - {}: {} ({})",
                    role,
                    agent.llm().primary_model(),
                    agent.llm().backend_model()
                );
            }
        }
    }

    /// 执行一次完整研究
    ///
    /// A cache hit replays the stored task outputs to the observer and makes
    /// no LLM calls. The whole run is bounded by the configured ceiling.
    pub async fn run(
        &self,
        research_id: &str,
        request: &ResearchRequest,
        observer: &dyn PipelineObserver,
    ) -> Result<PipelineResult> {
        let topic = &request.research_topic;

        if let Some(cached) = self
            .cache
            .get::<ResearchOutcome>(topic, &request.research_request)
            .await?
        {
            info!("📋 使用缓存的研究结果: {}", topic);
            for (task, output) in TASKS.iter().zip(&cached.tasks) {
                observer.task_started(task);
                observer.task_completed(task, &output.output);
            }
            let report_path = self.outlet.save(research_id, &cached.report).await?;
            return Ok(PipelineResult {
                research_id: research_id.to_string(),
                report: cached.report,
                report_path,
                tasks: cached.tasks,
                from_cache: true,
            });
        }

        info!("🚀 开始市场研究: {}", topic);
        self.log_agent_models();

        let outcome = match tokio::time::timeout(
            self.max_execution,
            self.execute(research_id, request, observer),
        )
        .await
        {
            Ok(outcome) => outcome?,
            Err(_) => {
                error!("⏰ 研究超时: {}", topic);
                return Err(anyhow!(
                    "Research exceeded the maximum execution time of {}s",
                    self.max_execution.as_secs()
                ));
            }
        };

        if let Err(e) = self
            .cache
            .set(topic, &request.research_request, &outcome)
            .await
        {
            warn!("⚠️ 研究结果缓存失败: {}", e);
        }

        let report_path = self.outlet.save(research_id, &outcome.report).await?;
        info!("✅ 研究完成: {}", topic);

        Ok(PipelineResult {
            research_id: research_id.to_string(),
            report: outcome.report,
            report_path,
            tasks: outcome.tasks,
            from_cache: false,
        })
    }

    async fn execute(
        &self,
        research_id: &str,
        request: &ResearchRequest,
        observer: &dyn PipelineObserver,
    ) -> Result<ResearchOutcome> {
        let mut memory = ResearchMemory::new();
        let mut tasks = Vec::with_capacity(TASKS.len());

        for task in &TASKS {
            info!("▶️ 任务开始: {} ({})", task.name, task.agent);
            observer.task_started(task);

            let result = match task.step {
                TaskStep::DataCollection => self.collect(request, &mut memory).await,
                TaskStep::Analysis => self.analyze(request, &mut memory).await,
                TaskStep::Report => self.report(request, &mut memory).await,
            };

            match result {
                Ok(output) => {
                    memory.store_task_output(task.name, &output);
                    observer.task_completed(task, &output);
                    info!("✅ 任务完成: {}", task.name);
                    tasks.push(TaskOutput {
                        task_name: task.name.to_string(),
                        agent: task.agent,
                        output,
                    });
                }
                Err(e) => {
                    let message = format!("{:#}", e);
                    error!("❌ 任务失败: {} - {}", task.name, message);
                    observer.task_failed(task, &message);
                    return Err(e.context(format!("Task {} failed", task.name)));
                }
            }
        }

        let generated_on = chrono::Local::now().format("%Y-%m-%d").to_string();
        let sections = ReportSections::from_memory(&mut memory);
        let report = render_report(research_id, request, &generated_on, &sections, &tasks);

        Ok(ResearchOutcome { report, tasks })
    }

    async fn run_chain<T: ChainOutput>(
        &self,
        input: ChainInput,
        memory: &mut ResearchMemory,
    ) -> Result<T> {
        let response = self
            .factory
            .execute::<T>(input)
            .await
            .with_context(|| format!("{} chain failed", T::KIND))?;
        memory.store_output(&response.output)?;
        Ok(response.output)
    }

    async fn collect(&self, request: &ResearchRequest, memory: &mut ResearchMemory) -> Result<String> {
        let topic = request.research_topic.as_str();
        let industry = request.industry_name.as_deref().unwrap_or(topic);

        let collected: CollectedData = self
            .run_chain(
                ChainInput::new(
                    topic,
                    format!(
                        "Collect market data for: {}\nRequest: {}",
                        topic, request.research_request
                    ),
                ),
                memory,
            )
            .await?;

        if let Some(company) = &request.company_name {
            self.run_chain::<CompanyResearch>(
                ChainInput::new(
                    topic,
                    format!("Research company: {} in context of {}", company, topic),
                )
                .with_var("company_name", company.as_str())
                .with_var("industry_context", industry),
                memory,
            )
            .await?;
        }

        let industry_data = to_json(&(&collected.market_metrics, &collected.industry_trends));
        self.run_chain::<IndustryAnalysis>(
            ChainInput::new(topic, format!("Analyze industry for: {}", industry))
                .with_var("industry_name", industry)
                .with_var("industry_data", industry_data),
            memory,
        )
        .await?;

        let market_data = to_json(&(&collected.market_metrics, &collected.consumer_insights));
        self.run_chain::<MarketTrends>(
            ChainInput::new(topic, format!("Analyze market trends for: {}", topic))
                .with_var("market_data", market_data),
            memory,
        )
        .await?;

        let material = memory.context_for(TASKS[0].chains);
        let invocation = self
            .agent(AgentRole::DigitalIntelligenceGatherer)?
            .write(
                &format!(
                    "Summarize the fact base collected for '{}' so the analysis team can work from it. Request: {}",
                    topic, request.research_request
                ),
                &material,
            )
            .await?;
        Ok(invocation.text)
    }

    async fn analyze(&self, request: &ResearchRequest, memory: &mut ResearchMemory) -> Result<String> {
        let topic = request.research_topic.as_str();
        let collected = memory.output::<CollectedData>().unwrap_or_default();
        let trends = memory.output::<MarketTrends>().unwrap_or_default();
        let industry = memory.output::<IndustryAnalysis>().unwrap_or_default();
        let previous = memory.task_output(DATA_COLLECTION_TASK).unwrap_or_default();

        let mut swot_input = ChainInput::new(topic, format!("Conduct SWOT analysis for: {}", topic))
            .with_var("competitor_data", to_json(&collected.competitor_data))
            .with_var("market_data", to_json(&trends))
            .with_var("context_data", previous);
        if let Some(company) = memory.output::<CompanyResearch>() {
            swot_input = swot_input.with_var("company_data", to_json(&company));
        }
        self.run_chain::<SwotAnalysis>(swot_input, memory).await?;

        let competitors = if collected.competitor_data.is_empty() {
            format!("The leading competitors in {}", topic)
        } else {
            collected
                .competitor_data
                .keys()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        };
        self.run_chain::<CompetitiveBenchmarking>(
            ChainInput::new(topic, format!("Benchmark competitors for: {}", topic))
                .with_var("competitors", competitors)
                .with_var("context_data", industry.competitive_landscape),
            memory,
        )
        .await?;

        let material = memory.context_for(&[
            ChainKind::SwotAnalysis,
            ChainKind::CompetitiveBenchmarking,
            ChainKind::MarketTrends,
        ]);
        let invocation = self
            .agent(AgentRole::QuantitativeInsightsSpecialist)?
            .write(
                &format!(
                    "Interpret the SWOT and benchmarking results for '{}'. Name the three most decisive findings with their numbers.",
                    topic
                ),
                &material,
            )
            .await?;
        Ok(invocation.text)
    }

    async fn report(&self, request: &ResearchRequest, memory: &mut ResearchMemory) -> Result<String> {
        let topic = request.research_topic.as_str();
        let analysis_kinds = [
            ChainKind::IndustryAnalysis,
            ChainKind::MarketTrends,
            ChainKind::SwotAnalysis,
            ChainKind::CompetitiveBenchmarking,
        ];

        self.run_chain::<ExecutiveSummary>(
            ChainInput::new(topic, format!("Create executive summary for: {}", topic))
                .with_var("analysis_results", memory.context_for(&analysis_kinds))
                .with_var("target_audience", "executives"),
            memory,
        )
        .await?;

        self.run_chain::<StrategicRecommendations>(
            ChainInput::new(
                topic,
                format!("Generate strategic recommendations for: {}", topic),
            )
            .with_var("business_context", request.research_request.as_str())
            .with_var("analysis_insights", memory.context_for(&analysis_kinds[1..]))
            .with_var("timeframe", "12 months"),
            memory,
        )
        .await?;

        self.run_chain::<ResearchReport>(
            ChainInput::new(topic, format!("Create research report for: {}", topic))
                .with_var("analysis_data", memory.context_for(&ChainKind::ALL))
                .with_var("target_audience", "stakeholders"),
            memory,
        )
        .await?;

        let material = memory.context_for(TASKS[2].chains);
        let narrative = self
            .agent(AgentRole::StrategicCommunicationsExpert)?
            .write(
                &format!(
                    "Write the closing narrative of the '{}' report for stakeholders: what was found and what to do next.",
                    topic
                ),
                &material,
            )
            .await?;

        let review = self
            .agent(AgentRole::SeniorResearchDirector)?
            .write(
                &format!(
                    "Review the research on '{}' against the original request: {}. State whether it answers the request and the single most important takeaway.",
                    topic, request.research_request
                ),
                &narrative.text,
            )
            .await?;

        Ok(format!(
            "{}\n\n#### Director's Assessment\n\n{}",
            narrative.text.trim(),
            review.text.trim()
        ))
    }
}
