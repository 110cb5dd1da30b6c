//! 知识库 - 从本地目录加载文档，按词项重叠度检索上下文片段

use std::collections::HashSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::{LazyLock, PoisonError, RwLock};

use anyhow::Result;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::chains::ChainKind;
use crate::config::KnowledgeConfig;

mod files;

pub use files::{
    KnowledgeError, KnowledgeFile, KnowledgeFileList, UploadedFile, delete_file, list_files,
    upload_file,
};

static TERM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-z0-9]+").unwrap());

/// Supplies topical context for a chain; `None` when nothing relevant exists.
pub trait ContextRetriever: Send + Sync {
    fn retrieve(&self, kind: ChainKind, query: &str) -> Option<String>;
}

/// 文档类型，对应知识库目录下的一级子目录名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    CompanyProfile,
    IndustryReport,
    MarketData,
    UserPreference,
}

impl DocumentType {
    pub const ALL: [DocumentType; 4] = [
        DocumentType::CompanyProfile,
        DocumentType::IndustryReport,
        DocumentType::MarketData,
        DocumentType::UserPreference,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::CompanyProfile => "company_profile",
            DocumentType::IndustryReport => "industry_report",
            DocumentType::MarketData => "market_data",
            DocumentType::UserPreference => "user_preference",
        }
    }

    pub fn from_dir_name(name: &str) -> Option<Self> {
        DocumentType::ALL.into_iter().find(|t| t.as_str() == name)
    }

    /// Document types consulted for a chain.
    pub fn relevant_to(kind: ChainKind) -> &'static [DocumentType] {
        use DocumentType::*;
        match kind {
            ChainKind::CompanyResearch => &[CompanyProfile, IndustryReport],
            ChainKind::IndustryAnalysis => &[IndustryReport, MarketData],
            ChainKind::SwotAnalysis => &[CompanyProfile, IndustryReport, MarketData],
            ChainKind::CompetitiveBenchmarking => &[CompanyProfile, MarketData],
            ChainKind::MarketTrends => &[MarketData, IndustryReport],
            ChainKind::DataCollection => &[MarketData, IndustryReport, CompanyProfile],
            ChainKind::ExecutiveSummary | ChainKind::StrategicRecommendations => {
                &[IndustryReport, MarketData, UserPreference]
            }
            ChainKind::ResearchReport => &[IndustryReport, MarketData, CompanyProfile],
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct KnowledgeDocument {
    pub doc_type: DocumentType,
    /// Path relative to the knowledge base root
    pub source: String,
    pub content: String,
    terms: HashSet<String>,
}

impl KnowledgeDocument {
    pub fn new(doc_type: DocumentType, source: &str, content: &str) -> Self {
        Self {
            doc_type,
            source: source.to_string(),
            content: content.to_string(),
            terms: terms_of(content),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KnowledgeStats {
    pub total_documents: usize,
    pub company_profiles: usize,
    pub industry_reports: usize,
    pub market_data: usize,
    pub user_preferences: usize,
}

/// 知识库
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    root: PathBuf,
    documents: Vec<KnowledgeDocument>,
    max_results: usize,
    snippet_chars: usize,
}

impl KnowledgeBase {
    pub fn new(config: &KnowledgeConfig, documents: Vec<KnowledgeDocument>) -> Self {
        Self {
            root: config.path.clone(),
            documents,
            max_results: config.max_results,
            snippet_chars: config.snippet_chars,
        }
    }

    /// 加载知识库目录；目录不存在时返回空知识库
    pub fn load(config: &KnowledgeConfig) -> Result<Self> {
        let root = &config.path;
        if !root.exists() {
            warn!("⚠️ 知识库目录不存在: {}", root.display());
            return Ok(Self::new(config, Vec::new()));
        }

        let mut documents = Vec::new();
        for entry in WalkDir::new(root).max_depth(5) {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type().is_file() || !is_supported(path) {
                continue;
            }

            let Some(doc_type) = document_type_of(root, path) else {
                debug!("跳过未分类的文档: {}", path.display());
                continue;
            };

            let Some(content) = read_document(path) else {
                continue;
            };
            let source = path
                .strip_prefix(root)
                .unwrap_or(path)
                .to_string_lossy()
                .to_string();
            documents.push(KnowledgeDocument::new(doc_type, &source, &content));
        }

        let knowledge = Self::new(config, documents);
        let stats = knowledge.stats();
        info!(
            "📚 知识库已加载: {} 篇文档 (公司 {}, 行业 {}, 市场 {}, 偏好 {})",
            stats.total_documents,
            stats.company_profiles,
            stats.industry_reports,
            stats.market_data,
            stats.user_preferences
        );
        Ok(knowledge)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Configuration that reloads this knowledge base from disk.
    pub fn config(&self) -> KnowledgeConfig {
        KnowledgeConfig {
            enabled: true,
            path: self.root.clone(),
            max_results: self.max_results,
            snippet_chars: self.snippet_chars,
        }
    }

    pub fn documents(&self) -> &[KnowledgeDocument] {
        &self.documents
    }

    /// Documents sharing at least one term with the query, best first.
    ///
    /// The score is the share of distinct query terms found in the document.
    pub fn search(
        &self,
        query: &str,
        doc_types: Option<&[DocumentType]>,
    ) -> Vec<(&KnowledgeDocument, f64)> {
        let query_terms = terms_of(query);
        if query_terms.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<_> = self
            .documents
            .iter()
            .filter(|doc| doc_types.is_none_or(|types| types.contains(&doc.doc_type)))
            .filter_map(|doc| {
                let shared = query_terms.intersection(&doc.terms).count();
                (shared > 0).then(|| (doc, shared as f64 / query_terms.len() as f64))
            })
            .collect();

        hits.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.source.cmp(&b.0.source)));
        hits.truncate(self.max_results);
        hits
    }

    pub fn stats(&self) -> KnowledgeStats {
        let count = |doc_type: DocumentType| {
            self.documents
                .iter()
                .filter(|d| d.doc_type == doc_type)
                .count()
        };
        KnowledgeStats {
            total_documents: self.documents.len(),
            company_profiles: count(DocumentType::CompanyProfile),
            industry_reports: count(DocumentType::IndustryReport),
            market_data: count(DocumentType::MarketData),
            user_preferences: count(DocumentType::UserPreference),
        }
    }

    fn snippet(&self, doc: &KnowledgeDocument, score: f64) -> String {
        let mut body: String = doc.content.chars().take(self.snippet_chars).collect();
        if doc.content.chars().count() > self.snippet_chars {
            body.push_str("...");
        }
        format!(
            "--- {} | {} | Similarity: {:.2} ---\n{}",
            doc.doc_type.as_str().to_uppercase(),
            doc.source,
            score,
            body.trim()
        )
    }
}

impl ContextRetriever for KnowledgeBase {
    fn retrieve(&self, kind: ChainKind, query: &str) -> Option<String> {
        let hits = self.search(query, Some(DocumentType::relevant_to(kind)));
        if hits.is_empty() {
            return None;
        }
        Some(
            hits.into_iter()
                .map(|(doc, score)| self.snippet(doc, score))
                .collect::<Vec<_>>()
                .join("\n\n"),
        )
    }
}

/// Retrieval through a knowledge base that may be reindexed while runs are in flight.
impl ContextRetriever for RwLock<KnowledgeBase> {
    fn retrieve(&self, kind: ChainKind, query: &str) -> Option<String> {
        self.read()
            .unwrap_or_else(PoisonError::into_inner)
            .retrieve(kind, query)
    }
}

/// 读取文档内容；非UTF-8内容按有损方式解码，读取失败时跳过
fn read_document(path: &Path) -> Option<String> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("⚠️ 读取知识库文件失败，已跳过: {} ({})", path.display(), e);
            return None;
        }
    };

    match String::from_utf8(bytes) {
        Ok(content) => Some(content),
        Err(e) => {
            warn!("⚠️ 知识库文件不是有效的UTF-8，按有损方式解码: {}", path.display());
            Some(String::from_utf8_lossy(e.as_bytes()).into_owned())
        }
    }
}

fn terms_of(text: &str) -> HashSet<String> {
    let lowered = text.to_lowercase();
    TERM.find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|term| term.len() > 2)
        .map(str::to_string)
        .collect()
}

pub(crate) fn is_supported(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("md") | Some("txt")
    )
}

fn document_type_of(root: &Path, path: &Path) -> Option<DocumentType> {
    let relative = path.strip_prefix(root).ok()?;
    let mut components = relative.components();
    let first = components.next()?;
    // files directly under the root have no type
    components.next()?;
    match first {
        Component::Normal(name) => DocumentType::from_dir_name(name.to_str()?),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config(path: &Path) -> KnowledgeConfig {
        KnowledgeConfig {
            enabled: true,
            path: path.to_path_buf(),
            max_results: 3,
            snippet_chars: 800,
        }
    }

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn sample_base() -> (TempDir, KnowledgeBase) {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(
            root,
            "company_profile/chargepoint.md",
            "ChargePoint operates the largest EV charging network in North America.",
        );
        write(
            root,
            "market_data/ev_growth.txt",
            "EV charging market grows at 28% CAGR with fleet electrification.",
        );
        write(
            root,
            "industry_report/energy.md",
            "Utilities invest in grid upgrades for charging demand.",
        );
        write(root, "user_preference/audience.md", "Board prefers concise summaries.");
        write(root, "market_data/raw.csv", "ev,charging,csv");
        write(root, "notes.md", "EV charging notes without a type");
        write(root, "misc/other.md", "EV charging in an unknown folder");

        let knowledge = KnowledgeBase::load(&config(root)).unwrap();
        (dir, knowledge)
    }

    #[test]
    fn test_load_classifies_by_first_directory() {
        let (_dir, knowledge) = sample_base();
        assert_eq!(
            knowledge.stats(),
            KnowledgeStats {
                total_documents: 4,
                company_profiles: 1,
                industry_reports: 1,
                market_data: 1,
                user_preferences: 1,
            }
        );
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let knowledge = KnowledgeBase::load(&config(&dir.path().join("absent"))).unwrap();
        assert_eq!(knowledge.stats().total_documents, 0);
        assert!(knowledge.retrieve(ChainKind::SwotAnalysis, "anything").is_none());
    }

    #[test]
    fn test_non_utf8_document_is_decoded_lossily() {
        let dir = TempDir::new().unwrap();
        let market = dir.path().join("market_data");
        fs::create_dir_all(&market).unwrap();
        fs::write(market.join("latin1.txt"), b"caf\xe9 prices rising").unwrap();
        write(dir.path(), "market_data/ok.md", "Coffee prices are stable.");

        let knowledge = KnowledgeBase::load(&config(dir.path())).unwrap();

        assert_eq!(knowledge.stats().market_data, 2);
        let hits = knowledge.search("prices rising", None);
        assert_eq!(hits[0].0.source, "market_data/latin1.txt");
        assert!(hits[0].0.content.contains('\u{FFFD}'));
    }

    #[test]
    fn test_shared_knowledge_base_sees_reload() {
        let dir = TempDir::new().unwrap();
        let shared = RwLock::new(KnowledgeBase::load(&config(dir.path())).unwrap());
        assert!(shared.retrieve(ChainKind::MarketTrends, "hydrogen trucks").is_none());

        write(dir.path(), "market_data/h2.md", "Hydrogen trucks enter pilot fleets.");
        let config = shared.read().unwrap().config();
        *shared.write().unwrap() = KnowledgeBase::load(&config).unwrap();

        let context = shared
            .retrieve(ChainKind::MarketTrends, "hydrogen trucks")
            .unwrap();
        assert!(context.contains("market_data/h2.md"));
    }

    #[test]
    fn test_search_ranks_by_term_overlap() {
        let (_dir, knowledge) = sample_base();
        let hits = knowledge.search("EV charging network growth", None);

        assert_eq!(hits[0].0.source, "company_profile/chargepoint.md");
        assert!(hits[0].1 > hits[1].1);
        assert!(hits.iter().all(|(_, score)| *score > 0.0 && *score <= 1.0));
    }

    #[test]
    fn test_retrieve_filters_by_chain_document_types() {
        let (_dir, knowledge) = sample_base();

        let context = knowledge
            .retrieve(ChainKind::MarketTrends, "EV charging demand")
            .unwrap();

        assert!(context.contains("--- MARKET_DATA | market_data/ev_growth.txt | Similarity:"));
        assert!(context.contains("INDUSTRY_REPORT"));
        assert!(!context.contains("COMPANY_PROFILE"));
    }

    #[test]
    fn test_retrieve_truncates_and_limits_results() {
        let dir = TempDir::new().unwrap();
        for i in 0..5 {
            write(
                dir.path(),
                &format!("market_data/doc{}.md", i),
                &format!("solar panels {}", "x".repeat(1000)),
            );
        }
        let knowledge = KnowledgeBase::load(&config(dir.path())).unwrap();

        let context = knowledge
            .retrieve(ChainKind::DataCollection, "solar panels")
            .unwrap();

        assert_eq!(context.matches("--- MARKET_DATA").count(), 3);
        for snippet in context.split("\n\n") {
            let body = snippet.lines().nth(1).unwrap();
            assert_eq!(body.chars().count(), 803);
        }
    }
}
