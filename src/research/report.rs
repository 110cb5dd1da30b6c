//! Markdown报告渲染

use crate::chains::{
    CollectedData, CompanyResearch, CompetitiveBenchmarking, ExecutiveSummary, IndustryAnalysis,
    MarketTrends, RecommendationItem, ResearchReport, StrategicRecommendations, SwotAnalysis,
    SwotItem, TrendItem,
};
use crate::memory::ResearchMemory;

use super::pipeline::{ResearchRequest, TaskOutput};

/// Typed chain outputs available for the report; absent chains are skipped.
#[derive(Debug, Clone, Default)]
pub struct ReportSections {
    pub collected: Option<CollectedData>,
    pub company: Option<CompanyResearch>,
    pub industry: Option<IndustryAnalysis>,
    pub trends: Option<MarketTrends>,
    pub swot: Option<SwotAnalysis>,
    pub benchmarking: Option<CompetitiveBenchmarking>,
    pub executive: Option<ExecutiveSummary>,
    pub recommendations: Option<StrategicRecommendations>,
    pub report: Option<ResearchReport>,
}

impl ReportSections {
    pub fn from_memory(memory: &mut ResearchMemory) -> Self {
        Self {
            collected: memory.output(),
            company: memory.output(),
            industry: memory.output(),
            trends: memory.output(),
            swot: memory.output(),
            benchmarking: memory.output(),
            executive: memory.output(),
            recommendations: memory.output(),
            report: memory.output(),
        }
    }
}

fn bullets(items: &[String]) -> String {
    items
        .iter()
        .filter(|item| !item.trim().is_empty())
        .map(|item| format!("- {}\n", item.trim()))
        .collect()
}

fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

fn paragraph(out: &mut String, heading: &str, text: &str) {
    if !text.trim().is_empty() {
        out.push_str(&format!("### {}\n\n{}\n\n", heading, text.trim()));
    }
}

fn swot_table(out: &mut String, title: &str, items: &[SwotItem]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("#### {}\n\n", title));
    out.push_str("| Item | Evidence | Impact | Confidence |\n|---|---|---|---|\n");
    for item in items {
        out.push_str(&format!(
            "| {} | {} | {} | {:.2} |\n",
            cell(&item.description),
            cell(&item.evidence),
            cell(&item.impact),
            item.confidence
        ));
    }
    out.push('\n');
}

fn trend_list(out: &mut String, title: &str, items: &[TrendItem]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("#### {}\n\n", title));
    for item in items {
        out.push_str(&format!(
            "- **{}** (impact: {}, confidence: {:.2}, timing: {})\n",
            item.trend, item.impact, item.confidence, item.timing
        ));
    }
    out.push('\n');
}

fn recommendation_list(out: &mut String, title: &str, items: &[RecommendationItem]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("#### {}\n\n", title));
    for item in items {
        out.push_str(&format!("- **{}**", item.action));
        if !item.owner.is_empty() || !item.timeline.is_empty() {
            out.push_str(&format!(" ({}, {})", item.owner, item.timeline));
        }
        out.push('\n');
        if !item.rationale.is_empty() {
            out.push_str(&format!("  - Rationale: {}\n", item.rationale));
        }
        if !item.expected_outcome.is_empty() {
            out.push_str(&format!("  - Expected outcome: {}\n", item.expected_outcome));
        }
        if !item.success_metrics.is_empty() {
            out.push_str(&format!(
                "  - Success metrics: {}\n",
                item.success_metrics.join(", ")
            ));
        }
    }
    out.push('\n');
}

/// 渲染完整的Markdown研究报告
pub fn render_report(
    research_id: &str,
    request: &ResearchRequest,
    generated_on: &str,
    sections: &ReportSections,
    tasks: &[TaskOutput],
) -> String {
    let mut out = format!(
        "# Market Research Report: {}\n\n- Research ID: `{}`\n- Date: {}\n- Request: {}\n\n",
        request.research_topic, research_id, generated_on, request.research_request
    );

    out.push_str("## Executive Summary\n\n");
    if let Some(executive) = &sections.executive {
        paragraph(&mut out, "Market Overview", &executive.market_overview);
        if !executive.key_insights.is_empty() {
            out.push_str("### Key Insights\n\n");
            out.push_str(&bullets(&executive.key_insights));
            out.push('\n');
        }
        if !executive.strategic_recommendations.is_empty() {
            out.push_str("### Priority Recommendations\n\n");
            out.push_str("| Priority | Action | Timeline | Resources | Expected Outcome |\n|---|---|---|---|---|\n");
            for rec in &executive.strategic_recommendations {
                out.push_str(&format!(
                    "| {} | {} | {} | {} | {} |\n",
                    cell(&rec.priority),
                    cell(&rec.action),
                    cell(&rec.timeline),
                    cell(&rec.resources),
                    cell(&rec.expected_outcome)
                ));
            }
            out.push('\n');
        }
        if !executive.risk_assessment.is_empty() {
            out.push_str("### Risks\n\n");
            out.push_str("| Risk | Probability | Impact | Mitigation |\n|---|---|---|---|\n");
            for risk in &executive.risk_assessment {
                out.push_str(&format!(
                    "| {} | {} | {} | {} |\n",
                    cell(&risk.risk),
                    cell(&risk.probability),
                    cell(&risk.impact),
                    cell(&risk.mitigation)
                ));
            }
            out.push('\n');
        }
        if !executive.success_metrics.is_empty() {
            out.push_str("### Success Metrics\n\n");
            out.push_str(&bullets(&executive.success_metrics));
            out.push('\n');
        }
    } else if let Some(report) = &sections.report {
        out.push_str(&format!("{}\n\n", report.executive_summary.trim()));
    }

    if let Some(industry) = &sections.industry {
        out.push_str("## Industry Analysis\n\n");
        out.push_str(&format!(
            "- Market size: {}\n- Growth rate: {}\n\n",
            industry.market_size, industry.growth_rate
        ));
        if !industry.key_segments.is_empty() {
            out.push_str("### Key Segments\n\n");
            out.push_str(&bullets(&industry.key_segments));
            out.push('\n');
        }
        paragraph(&mut out, "Competitive Landscape", &industry.competitive_landscape);
        if !industry.key_metrics.is_empty() {
            out.push_str("| Metric | Value | Trend |\n|---|---|---|\n");
            for metric in &industry.key_metrics {
                out.push_str(&format!(
                    "| {} | {} | {} |\n",
                    cell(&metric.name),
                    cell(&metric.value),
                    cell(&metric.trend)
                ));
            }
            out.push('\n');
        }
        if !industry.strategic_implications.is_empty() {
            out.push_str("### Strategic Implications\n\n");
            out.push_str(&bullets(&industry.strategic_implications));
            out.push('\n');
        }
    }

    if let Some(company) = &sections.company {
        out.push_str(&format!("## Company Profile: {}\n\n", company.company_name));
        paragraph(&mut out, "Overview", &company.overview);
        paragraph(&mut out, "Market Position", &company.market_position);
        paragraph(&mut out, "Financial Health", &company.financial_health);
        if !company.key_metrics.is_empty() {
            for metric in &company.key_metrics {
                out.push_str(&format!("- {}: {}\n", metric.category, metric.value));
            }
            out.push('\n');
        }
    }

    if let Some(trends) = &sections.trends {
        out.push_str("## Market Trends\n\n");
        trend_list(&mut out, "Technology", &trends.technology_trends);
        trend_list(&mut out, "Consumer", &trends.consumer_trends);
        trend_list(&mut out, "Regulatory", &trends.regulatory_trends);
        trend_list(&mut out, "Economic", &trends.economic_trends);
        if !trends.key_insights.is_empty() {
            out.push_str("### Trend Insights\n\n");
            out.push_str(&bullets(&trends.key_insights));
            out.push('\n');
        }
    }

    if let Some(swot) = &sections.swot {
        out.push_str("## SWOT Analysis\n\n");
        swot_table(&mut out, "Strengths", &swot.strengths);
        swot_table(&mut out, "Weaknesses", &swot.weaknesses);
        swot_table(&mut out, "Opportunities", &swot.opportunities);
        swot_table(&mut out, "Threats", &swot.threats);
        paragraph(&mut out, "Overall Assessment", &swot.overall_assessment);
    }

    if let Some(benchmarking) = &sections.benchmarking {
        out.push_str("## Competitive Benchmarking\n\n");
        if !benchmarking.competitors.is_empty() {
            out.push_str(
                "| Competitor | Product | Pricing | Presence | Customer | Overall |\n|---|---|---|---|---|---|\n",
            );
            for c in &benchmarking.competitors {
                out.push_str(&format!(
                    "| {} | {:.1} | {:.1} | {:.1} | {:.1} | {:.1} |\n",
                    cell(&c.name),
                    c.product_score,
                    c.pricing_score,
                    c.market_presence_score,
                    c.customer_focus_score,
                    c.overall_score
                ));
            }
            out.push('\n');
        }
        if !benchmarking.key_findings.is_empty() {
            out.push_str("### Key Findings\n\n");
            out.push_str(&bullets(&benchmarking.key_findings));
            out.push('\n');
        }
        paragraph(
            &mut out,
            "Competitive Landscape",
            &benchmarking.competitive_landscape,
        );
    }

    if let Some(recommendations) = &sections.recommendations {
        out.push_str("## Strategic Recommendations\n\n");
        recommendation_list(
            &mut out,
            "Immediate Actions (0-3 months)",
            &recommendations.immediate_actions,
        );
        recommendation_list(
            &mut out,
            "Short-term Initiatives (3-12 months)",
            &recommendations.short_term_initiatives,
        );
        recommendation_list(
            &mut out,
            "Long-term Strategies (1-3 years)",
            &recommendations.long_term_strategies,
        );
        paragraph(&mut out, "Overall Priority", &recommendations.overall_priority);
    }

    if let Some(report) = &sections.report {
        out.push_str("## Detailed Findings\n\n");
        paragraph(&mut out, "Methodology", &report.methodology);
        paragraph(&mut out, "Market Overview", &report.market_overview);
        paragraph(&mut out, "Competitive Analysis", &report.competitive_analysis);
        if !report.strategic_recommendations.is_empty() {
            out.push_str("### Recommendations\n\n");
            out.push_str(&bullets(&report.strategic_recommendations));
            out.push('\n');
        }
        paragraph(
            &mut out,
            "Implementation Roadmap",
            &report.implementation_roadmap,
        );
    }

    if let Some(collected) = &sections.collected {
        if !collected.data_sources.is_empty() {
            out.push_str("## Data Sources\n\n");
            out.push_str(&bullets(&collected.data_sources));
            out.push('\n');
        }
    }

    if !tasks.is_empty() {
        out.push_str("## Research Process\n\n");
        for task in tasks {
            out.push_str(&format!(
                "### {} ({})\n\n{}\n\n",
                task.task_name,
                task.agent.title(),
                task.output.trim()
            ));
        }
    }

    out
}
