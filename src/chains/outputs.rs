//! 各分析链的结构化输出类型
//!
//! Every type tolerates missing fields so a partially filled reply still parses.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ChainKind;

/// Output type of one chain, tied to its kind.
pub trait ChainOutput:
    JsonSchema + DeserializeOwned + Serialize + Send + Sync + 'static
{
    const KIND: ChainKind;
}

// ---------- research ----------

/// Raw market data gathered before analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct CollectedData {
    /// Competitor intelligence keyed by competitor name
    pub competitor_data: BTreeMap<String, Value>,
    /// Market size, growth and similar metrics
    pub market_metrics: BTreeMap<String, Value>,
    pub consumer_insights: BTreeMap<String, Value>,
    pub industry_trends: BTreeMap<String, Value>,
    /// Where each figure came from
    pub data_sources: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct CompanyMetric {
    pub category: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct CompanyResearch {
    pub company_name: String,
    pub overview: String,
    pub products_services: Vec<String>,
    pub market_position: String,
    pub financial_health: String,
    pub key_metrics: Vec<CompanyMetric>,
    pub strengths: Vec<String>,
    pub challenges: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct IndustryMetric {
    pub name: String,
    pub value: String,
    /// up, down or stable
    pub trend: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct IndustryAnalysis {
    pub market_size: String,
    pub growth_rate: String,
    pub key_segments: Vec<String>,
    pub competitive_landscape: String,
    pub key_metrics: Vec<IndustryMetric>,
    pub strategic_implications: Vec<String>,
}

// ---------- analysis ----------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SwotItem {
    pub description: String,
    /// Concrete data point backing the item
    pub evidence: String,
    /// HIGH, MEDIUM or LOW
    pub impact: String,
    /// 置信度，0.0到1.0之间
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SwotAnalysis {
    pub strengths: Vec<SwotItem>,
    pub weaknesses: Vec<SwotItem>,
    pub opportunities: Vec<SwotItem>,
    pub threats: Vec<SwotItem>,
    pub overall_assessment: String,
}

/// Scores are on a 0-10 scale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct CompetitorScore {
    pub name: String,
    pub product_score: f64,
    pub pricing_score: f64,
    pub market_presence_score: f64,
    pub customer_focus_score: f64,
    /// Weighted: product 40%, pricing 25%, presence 20%, customer 15%
    pub overall_score: f64,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct CompetitiveBenchmarking {
    pub competitors: Vec<CompetitorScore>,
    pub key_findings: Vec<String>,
    pub competitive_landscape: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TrendItem {
    pub trend: String,
    pub impact: String,
    pub confidence: f64,
    /// IMMINENT, NEAR-TERM or LONG-TERM
    pub timing: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct MarketTrends {
    pub technology_trends: Vec<TrendItem>,
    pub consumer_trends: Vec<TrendItem>,
    pub regulatory_trends: Vec<TrendItem>,
    pub economic_trends: Vec<TrendItem>,
    pub key_insights: Vec<String>,
}

// ---------- reporting ----------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct StrategicRecommendation {
    pub priority: String,
    pub action: String,
    pub timeline: String,
    pub resources: String,
    pub expected_outcome: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RiskAssessment {
    pub risk: String,
    pub probability: String,
    pub impact: String,
    pub mitigation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ExecutiveSummary {
    pub market_overview: String,
    pub key_insights: Vec<String>,
    pub strategic_recommendations: Vec<StrategicRecommendation>,
    pub risk_assessment: Vec<RiskAssessment>,
    pub success_metrics: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RecommendationItem {
    pub action: String,
    pub rationale: String,
    pub owner: String,
    pub timeline: String,
    pub resources: String,
    pub expected_outcome: String,
    pub success_metrics: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct StrategicRecommendations {
    /// 0-3 months
    pub immediate_actions: Vec<RecommendationItem>,
    /// 3-12 months
    pub short_term_initiatives: Vec<RecommendationItem>,
    /// 1-3 years
    pub long_term_strategies: Vec<RecommendationItem>,
    pub overall_priority: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ResearchReport {
    pub executive_summary: String,
    pub methodology: String,
    pub market_overview: String,
    pub competitive_analysis: String,
    pub strategic_recommendations: Vec<String>,
    pub implementation_roadmap: String,
}

impl ChainOutput for CollectedData {
    const KIND: ChainKind = ChainKind::DataCollection;
}

impl ChainOutput for CompanyResearch {
    const KIND: ChainKind = ChainKind::CompanyResearch;
}

impl ChainOutput for IndustryAnalysis {
    const KIND: ChainKind = ChainKind::IndustryAnalysis;
}

impl ChainOutput for SwotAnalysis {
    const KIND: ChainKind = ChainKind::SwotAnalysis;
}

impl ChainOutput for CompetitiveBenchmarking {
    const KIND: ChainKind = ChainKind::CompetitiveBenchmarking;
}

impl ChainOutput for MarketTrends {
    const KIND: ChainKind = ChainKind::MarketTrends;
}

impl ChainOutput for ExecutiveSummary {
    const KIND: ChainKind = ChainKind::ExecutiveSummary;
}

impl ChainOutput for StrategicRecommendations {
    const KIND: ChainKind = ChainKind::StrategicRecommendations;
}

impl ChainOutput for ResearchReport {
    const KIND: ChainKind = ChainKind::ResearchReport;
}
