//! 研究智能体 - 四个角色，各自绑定到其任务类型的模型适配器

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::llm::{Invocation, LLMClient, LlmError, ModelBackedLlm, TaskType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    SeniorResearchDirector,
    DigitalIntelligenceGatherer,
    QuantitativeInsightsSpecialist,
    StrategicCommunicationsExpert,
}

impl AgentRole {
    pub const ALL: [AgentRole; 4] = [
        AgentRole::SeniorResearchDirector,
        AgentRole::DigitalIntelligenceGatherer,
        AgentRole::QuantitativeInsightsSpecialist,
        AgentRole::StrategicCommunicationsExpert,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            AgentRole::SeniorResearchDirector => "Senior Research Director",
            AgentRole::DigitalIntelligenceGatherer => "Digital Intelligence Gatherer",
            AgentRole::QuantitativeInsightsSpecialist => "Quantitative Insights Specialist",
            AgentRole::StrategicCommunicationsExpert => "Strategic Communications Expert",
        }
    }

    /// Task type whose model the agent's own calls are routed to.
    pub fn task_type(&self) -> TaskType {
        match self {
            AgentRole::SeniorResearchDirector => TaskType::ExecutiveSummary,
            AgentRole::DigitalIntelligenceGatherer => TaskType::DataCollection,
            AgentRole::QuantitativeInsightsSpecialist => TaskType::SwotAnalysis,
            AgentRole::StrategicCommunicationsExpert => TaskType::ResearchReport,
        }
    }

    fn goal(&self) -> &'static str {
        match self {
            AgentRole::SeniorResearchDirector => {
                "Judge whether the research answers the request and state what a decision maker should take away."
            }
            AgentRole::DigitalIntelligenceGatherer => {
                "Turn raw market, industry and trend data into a compact fact base with sources."
            }
            AgentRole::QuantitativeInsightsSpecialist => {
                "Extract the quantitative signal from SWOT and benchmarking results and flag the decisive gaps."
            }
            AgentRole::StrategicCommunicationsExpert => {
                "Explain the findings and recommendations in clear business language for stakeholders."
            }
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// 研究智能体
#[derive(Clone)]
pub struct ResearchAgent {
    role: AgentRole,
    llm: ModelBackedLlm,
}

impl ResearchAgent {
    pub fn new(role: AgentRole, client: &LLMClient) -> Self {
        Self {
            role,
            llm: client.for_task(role.task_type()),
        }
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    pub fn llm(&self) -> &ModelBackedLlm {
        &self.llm
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are the {} of a market research team. {}\nWrite in Markdown. Be specific and cite figures from the material you are given.",
            self.role.title(),
            self.role.goal()
        )
    }

    /// 根据任务说明与上游结果撰写本任务的结论
    pub async fn write(
        &self,
        instructions: &str,
        material: &str,
    ) -> Result<Invocation, LlmError> {
        let prompt = format!("{}\n\nMATERIAL:\n{}", instructions, material);
        self.llm
            .generate_with_system(&self.system_prompt(), &prompt)
            .await
    }
}
