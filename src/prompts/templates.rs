//! 内置提示词模板

use super::{PromptCategory, PromptTemplate};

pub(super) const CHAIN_OF_THOUGHT: &str = r#"
REASONING PROCESS:
1. Review the available data and note the patterns that matter
2. Split the problem into its components
3. Apply the analytical framework described above
4. Synthesize the findings into conclusions
5. Shape the final answer to the requested output format
"#;

const DATA_COLLECTION: &str = r#"MARKET DATA COLLECTION

Topic: {research_topic}
Collection date: {current_date}

Gather the facts a strategy team needs before any analysis starts:
- Competitors: names, positioning, pricing, recent moves
- Market metrics: size, growth rate, segment split, regional spread
- Consumer insights: buying drivers, adoption barriers, sentiment
- Industry trends: technology shifts, regulation, capital flows

Source guidance:
Primary sources: {primary_sources}
Secondary sources: {secondary_sources}
Tertiary sources: {tertiary_sources}

Every figure must name where it came from. Mark estimates as estimates.

{format_instructions}"#;

const COMPANY_RESEARCH: &str = r#"COMPANY INTELLIGENCE PROFILE

Company: {company_name}
Market: {research_topic}
Industry context: {industry_context}
Research date: {current_date}

Build a profile covering business overview, products and services, market
position, financial health, headline metrics, strengths and challenges.

Data sources to prefer:
{data_sources}

{format_instructions}"#;

const INDUSTRY_ANALYSIS: &str = r#"INDUSTRY ANALYSIS

Industry: {industry_name}
Topic: {research_topic}
Analysis date: {current_date}

Cover market size and growth, the main segments, the competitive landscape
(concentration, entry barriers, bargaining power) and the metrics an
executive would track. Close with the strategic implications.

Industry data:
{industry_data}

{format_instructions}"#;

const SWOT_ANALYSIS: &str = r#"SWOT ANALYSIS

Topic: {research_topic}
Analysis date: {current_date}

Inputs:
- Competitor intelligence: {competitor_data}
- Market metrics: {market_data}
- Company context: {company_data}
- Additional research: {context_data}

Rules:
- Each item cites concrete evidence, not generic statements
- Impact is HIGH, MEDIUM or LOW
- Confidence is a number between 0.0 and 1.0 reflecting source quality
- Keep the four quadrants balanced and prefer actionable items

{format_instructions}"#;

const COMPETITIVE_BENCHMARKING: &str = r#"COMPETITIVE BENCHMARKING

Market segment: {research_topic}
Analysis date: {current_date}
Competitor set: {competitors}

Score each competitor from 0 to 10 on four weighted dimensions:
- Product features (40%)
- Pricing strategy (25%)
- Market presence (20%)
- Customer focus (15%)

The overall score is the weighted average. Apply the same method to every
competitor and list concrete strengths and weaknesses for each.

Additional context:
{context_data}

{format_instructions}"#;

const MARKET_TRENDS: &str = r#"MARKET TRENDS

Industry: {research_topic}
Current date: {current_date}
Horizon: 1-2 years and 3-5 years

Classify trends as technology, consumer, regulatory or economic. For each
trend give its impact (HIGH, MEDIUM, LOW), a confidence level and the
expected timing (IMMINENT, NEAR-TERM, LONG-TERM).

Market data:
{market_data}

{format_instructions}"#;

const EXECUTIVE_SUMMARY: &str = r#"EXECUTIVE SUMMARY

Topic: {research_topic}
Date: {current_date}
Audience: {target_audience}

Condense the analysis below into a summary an executive can act on: a market
overview, the key insights, prioritized recommendations, the main risks with
mitigations and the metrics that define success.

Analysis results:
{analysis_results}

{format_instructions}"#;

const RESEARCH_REPORT: &str = r#"RESEARCH REPORT

Title: Market Analysis: {research_topic}
Date: {current_date}
Audience: {target_audience}

Write the full report: executive summary, methodology, market overview,
competitive analysis, strategic recommendations and an implementation
roadmap. Use only the material below and keep claims traceable.

Analysis data:
{analysis_data}

{format_instructions}"#;

const STRATEGIC_RECOMMENDATIONS: &str = r#"STRATEGIC RECOMMENDATIONS

Topic: {research_topic}
Decision date: {current_date}
Situation: {business_context}
Timeframe: {timeframe}

Turn the insights below into recommendations grouped by horizon: immediate
actions (0-3 months), short-term initiatives (3-12 months) and long-term
strategies (1-3 years). Each needs a rationale, an owner, resources, the
expected outcome and success metrics.

Insights:
{analysis_insights}

{format_instructions}"#;

pub(super) const BUILTIN_TEMPLATES: &[PromptTemplate] = &[
    PromptTemplate {
        category: PromptCategory::Research,
        name: "data_collection",
        body: DATA_COLLECTION,
        role: "Market Intelligence Specialist",
        expertise: &[
            "Multi-source Data Collection",
            "Data Validation",
            "Competitive Intelligence",
        ],
        required: &["research_topic", "current_date", "format_instructions"],
        optional: &["primary_sources", "secondary_sources", "tertiary_sources"],
    },
    PromptTemplate {
        category: PromptCategory::Research,
        name: "company_research",
        body: COMPANY_RESEARCH,
        role: "Company Intelligence Analyst",
        expertise: &[
            "Business Profiling",
            "Financial Analysis",
            "Strategic Assessment",
        ],
        required: &[
            "research_topic",
            "current_date",
            "company_name",
            "format_instructions",
        ],
        optional: &["data_sources", "industry_context"],
    },
    PromptTemplate {
        category: PromptCategory::Research,
        name: "industry_analysis",
        body: INDUSTRY_ANALYSIS,
        role: "Industry Research Specialist",
        expertise: &[
            "Market Sizing",
            "Value Chain Analysis",
            "Competitive Dynamics",
        ],
        required: &[
            "research_topic",
            "current_date",
            "industry_name",
            "format_instructions",
        ],
        optional: &["industry_data"],
    },
    PromptTemplate {
        category: PromptCategory::Analysis,
        name: "swot_analysis",
        body: SWOT_ANALYSIS,
        role: "Senior Strategic Analyst",
        expertise: &[
            "SWOT Analysis",
            "Business Strategy",
            "Competitive Intelligence",
        ],
        required: &["research_topic", "current_date", "format_instructions"],
        optional: &[
            "competitor_data",
            "market_data",
            "company_data",
            "context_data",
        ],
    },
    PromptTemplate {
        category: PromptCategory::Analysis,
        name: "competitive_benchmarking",
        body: COMPETITIVE_BENCHMARKING,
        role: "Competitive Intelligence Specialist",
        expertise: &[
            "Quantitative Analysis",
            "Market Positioning",
            "Strategic Benchmarking",
        ],
        required: &[
            "research_topic",
            "current_date",
            "competitors",
            "format_instructions",
        ],
        optional: &["context_data"],
    },
    PromptTemplate {
        category: PromptCategory::Analysis,
        name: "market_trends",
        body: MARKET_TRENDS,
        role: "Market Trends Analyst",
        expertise: &["Pattern Recognition", "Forecasting", "Industry Analysis"],
        required: &["research_topic", "current_date", "format_instructions"],
        optional: &["market_data"],
    },
    PromptTemplate {
        category: PromptCategory::Reporting,
        name: "executive_summary",
        body: EXECUTIVE_SUMMARY,
        role: "Chief Strategy Officer",
        expertise: &[
            "Executive Communication",
            "Strategic Synthesis",
            "Decision Support",
        ],
        required: &[
            "research_topic",
            "current_date",
            "analysis_results",
            "format_instructions",
        ],
        optional: &["target_audience"],
    },
    PromptTemplate {
        category: PromptCategory::Reporting,
        name: "research_report",
        body: RESEARCH_REPORT,
        role: "Senior Research Director",
        expertise: &[
            "Comprehensive Analysis",
            "Business Writing",
            "Stakeholder Management",
        ],
        required: &[
            "research_topic",
            "current_date",
            "analysis_data",
            "format_instructions",
        ],
        optional: &["target_audience"],
    },
    PromptTemplate {
        category: PromptCategory::Reporting,
        name: "strategic_recommendations",
        body: STRATEGIC_RECOMMENDATIONS,
        role: "Management Consultant",
        expertise: &[
            "Strategic Planning",
            "Implementation Roadmapping",
            "ROI Analysis",
        ],
        required: &[
            "research_topic",
            "current_date",
            "business_context",
            "analysis_insights",
            "format_instructions",
        ],
        optional: &["timeframe"],
    },
];
