//! 模型管理器 - 逻辑模型注册表、任务分配表与降级链

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, LLMConfig, RoutingConfig};

/// Internal alias for a backend model, decoupled from the provider's model id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalModel {
    Fast,
    Creative,
    Precise,
    Fallback,
}

impl LogicalModel {
    pub const ALL: [LogicalModel; 4] = [
        LogicalModel::Fast,
        LogicalModel::Creative,
        LogicalModel::Precise,
        LogicalModel::Fallback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalModel::Fast => "fast",
            LogicalModel::Creative => "creative",
            LogicalModel::Precise => "precise",
            LogicalModel::Fallback => "fallback",
        }
    }
}

impl fmt::Display for LogicalModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogicalModel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogicalModel::ALL
            .into_iter()
            .find(|model| model.as_str() == s.trim())
            .ok_or_else(|| ConfigError::UnknownModel(s.to_string()))
    }
}

/// Pipeline step requesting a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    DataCollection,
    CompanyResearch,
    IndustryAnalysis,
    SwotAnalysis,
    CompetitiveBenchmarking,
    MarketTrends,
    ExecutiveSummary,
    ResearchReport,
    StrategicRecommendations,
    /// Anything without a dedicated entry, e.g. a connection check.
    General,
}

impl TaskType {
    pub const ALL: [TaskType; 10] = [
        TaskType::DataCollection,
        TaskType::CompanyResearch,
        TaskType::IndustryAnalysis,
        TaskType::SwotAnalysis,
        TaskType::CompetitiveBenchmarking,
        TaskType::MarketTrends,
        TaskType::ExecutiveSummary,
        TaskType::ResearchReport,
        TaskType::StrategicRecommendations,
        TaskType::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::DataCollection => "data_collection",
            TaskType::CompanyResearch => "company_research",
            TaskType::IndustryAnalysis => "industry_analysis",
            TaskType::SwotAnalysis => "swot_analysis",
            TaskType::CompetitiveBenchmarking => "competitive_benchmarking",
            TaskType::MarketTrends => "market_trends",
            TaskType::ExecutiveSummary => "executive_summary",
            TaskType::ResearchReport => "research_report",
            TaskType::StrategicRecommendations => "strategic_recommendations",
            TaskType::General => "general",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .into_iter()
            .find(|task| task.as_str() == s.trim())
            .ok_or_else(|| ConfigError::UnknownTaskType(s.to_string()))
    }
}

/// 模型管理器
///
/// Immutable after construction and shared by every adapter through an `Arc`.
pub struct ModelManager {
    models: HashMap<LogicalModel, String>,
    task_models: HashMap<TaskType, LogicalModel>,
    fallback_chains: HashMap<LogicalModel, Vec<LogicalModel>>,
    default_model: LogicalModel,
    default_fallback_chain: Vec<LogicalModel>,
    api_key: String,
}

impl fmt::Debug for ModelManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelManager")
            .field("models", &self.models)
            .field("task_models", &self.task_models)
            .field("fallback_chains", &self.fallback_chains)
            .field("default_model", &self.default_model)
            .field("default_fallback_chain", &self.default_fallback_chain)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl ModelManager {
    /// Builds the manager, resolving the credential from the LLM config or its environment variable.
    pub fn from_env(routing: &RoutingConfig, llm: &LLMConfig) -> Result<Self, ConfigError> {
        let api_key = llm.resolve_api_key()?;
        Self::new(routing, &api_key)
    }

    pub fn new(routing: &RoutingConfig, api_key: &str) -> Result<Self, ConfigError> {
        if api_key.trim().is_empty() {
            return Err(ConfigError::MissingCredential("api_key".to_string()));
        }

        let mut models = HashMap::new();
        for (name, backend_model) in &routing.models {
            models.insert(name.parse::<LogicalModel>()?, backend_model.clone());
        }

        let registered = |model: LogicalModel| -> Result<LogicalModel, ConfigError> {
            if models.contains_key(&model) {
                Ok(model)
            } else {
                Err(ConfigError::UnregisteredModel(model.to_string()))
            }
        };

        let mut task_models = HashMap::new();
        for (task, model) in &routing.task_models {
            let task = task.parse::<TaskType>()?;
            let model = registered(model.parse::<LogicalModel>()?)?;
            task_models.insert(task, model);
        }

        let mut fallback_chains = HashMap::new();
        for (model, chain) in &routing.fallback_chains {
            let model = registered(model.parse::<LogicalModel>()?)?;
            let chain = chain
                .iter()
                .map(|name| name.parse::<LogicalModel>().and_then(registered))
                .collect::<Result<Vec<_>, _>>()?;
            fallback_chains.insert(model, chain);
        }

        let default_model = registered(routing.default_model.parse::<LogicalModel>()?)?;
        let default_fallback_chain = routing
            .default_fallback_chain
            .iter()
            .map(|name| name.parse::<LogicalModel>().and_then(registered))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            models,
            task_models,
            fallback_chains,
            default_model,
            default_fallback_chain,
            api_key: api_key.to_string(),
        })
    }

    /// 根据任务类型选择逻辑模型，未配置的任务使用默认模型
    pub fn get_model_for_task(&self, task_type: TaskType) -> LogicalModel {
        self.task_models
            .get(&task_type)
            .copied()
            .unwrap_or(self.default_model)
    }

    /// Same lookup keyed by the raw task name; unrecognised names get the default model.
    pub fn model_for_task_name(&self, task_name: &str) -> LogicalModel {
        match task_name.parse::<TaskType>() {
            Ok(task_type) => self.get_model_for_task(task_type),
            Err(_) => self.default_model,
        }
    }

    /// 获取降级链
    ///
    /// The result never contains `model` itself and has no duplicates.
    pub fn get_fallback_chain(&self, model: LogicalModel) -> Vec<LogicalModel> {
        let chain = self
            .fallback_chains
            .get(&model)
            .unwrap_or(&self.default_fallback_chain);

        let mut seen = HashSet::from([model]);
        chain
            .iter()
            .copied()
            .filter(|candidate| seen.insert(*candidate))
            .collect()
    }

    /// Backend model id registered for a logical model.
    pub fn backend_model(&self, model: LogicalModel) -> Option<&str> {
        self.models.get(&model).map(String::as_str)
    }

    pub fn default_model(&self) -> LogicalModel {
        self.default_model
    }

    pub fn registered_models(&self) -> Vec<(LogicalModel, &str)> {
        let mut models: Vec<_> = self
            .models
            .iter()
            .map(|(model, id)| (*model, id.as_str()))
            .collect();
        models.sort();
        models
    }

    pub(crate) fn api_key(&self) -> &str {
        &self.api_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn routing(
        task_models: &[(&str, &str)],
        fallback_chains: &[(&str, &[&str])],
    ) -> RoutingConfig {
        RoutingConfig {
            models: LogicalModel::ALL
                .iter()
                .map(|m| (m.to_string(), format!("backend-{}", m)))
                .collect(),
            task_models: task_models
                .iter()
                .map(|(t, m)| (t.to_string(), m.to_string()))
                .collect(),
            fallback_chains: fallback_chains
                .iter()
                .map(|(m, chain)| (m.to_string(), chain.iter().map(|c| c.to_string()).collect()))
                .collect(),
            default_model: "fast".to_string(),
            default_fallback_chain: vec!["fallback".to_string()],
        }
    }

    #[test]
    fn test_swot_analysis_routes_to_precise() {
        let routing = routing(
            &[("swot_analysis", "precise")],
            &[("precise", &["fast", "fallback"])],
        );
        let manager = ModelManager::new(&routing, "key").unwrap();

        assert_eq!(
            manager.get_model_for_task(TaskType::SwotAnalysis),
            LogicalModel::Precise
        );
        assert_eq!(
            manager.get_fallback_chain(LogicalModel::Precise),
            vec![LogicalModel::Fast, LogicalModel::Fallback]
        );
        assert_eq!(
            manager.backend_model(LogicalModel::Precise),
            Some("backend-precise")
        );
    }

    #[test]
    fn test_unknown_task_uses_default_model_every_time() {
        let manager = ModelManager::new(&routing(&[], &[]), "key").unwrap();

        for _ in 0..3 {
            assert_eq!(
                manager.model_for_task_name("quarterly_horoscope"),
                LogicalModel::Fast
            );
            assert_eq!(
                manager.get_model_for_task(TaskType::General),
                LogicalModel::Fast
            );
        }
    }

    #[test]
    fn test_known_task_name_resolves_like_enum() {
        let manager =
            ModelManager::new(&routing(&[("market_trends", "creative")], &[]), "key").unwrap();

        assert_eq!(
            manager.model_for_task_name("market_trends"),
            LogicalModel::Creative
        );
    }

    #[test]
    fn test_fallback_chain_never_contains_model_itself() {
        let manager = ModelManager::new(
            &routing(
                &[],
                &[
                    ("fast", &["fast", "creative", "creative", "fallback"]),
                    ("fallback", &["fallback"]),
                ],
            ),
            "key",
        )
        .unwrap();

        for model in LogicalModel::ALL {
            let chain = manager.get_fallback_chain(model);
            assert!(!chain.contains(&model), "{} chain contains itself", model);
        }
        assert_eq!(
            manager.get_fallback_chain(LogicalModel::Fast),
            vec![LogicalModel::Creative, LogicalModel::Fallback]
        );
        assert!(manager.get_fallback_chain(LogicalModel::Fallback).is_empty());
    }

    #[test]
    fn test_unknown_model_uses_default_chain() {
        let manager = ModelManager::new(&routing(&[], &[]), "key").unwrap();

        assert_eq!(
            manager.get_fallback_chain(LogicalModel::Creative),
            vec![LogicalModel::Fallback]
        );
    }

    #[test]
    fn test_cyclic_chains_terminate_with_visited_set() {
        let manager = ModelManager::new(
            &routing(
                &[],
                &[
                    ("creative", &["precise"]),
                    ("precise", &["fast"]),
                    ("fast", &["creative"]),
                ],
            ),
            "key",
        )
        .unwrap();

        for start in LogicalModel::ALL {
            let mut visited = HashSet::new();
            let mut frontier = vec![start];
            let mut steps = 0;
            while let Some(model) = frontier.pop() {
                if !visited.insert(model) {
                    continue;
                }
                steps += 1;
                frontier.extend(manager.get_fallback_chain(model));
            }
            assert!(steps <= LogicalModel::ALL.len());
        }
    }

    #[test]
    fn test_empty_credential_is_fatal() {
        let result = ModelManager::new(&RoutingConfig::default(), "  ");
        assert!(matches!(result, Err(ConfigError::MissingCredential(_))));
    }

    #[test]
    fn test_typo_in_task_type_is_rejected() {
        let result = ModelManager::new(&routing(&[("swot_analysys", "precise")], &[]), "key");
        assert_eq!(
            result.unwrap_err(),
            ConfigError::UnknownTaskType("swot_analysys".to_string())
        );
    }

    #[test]
    fn test_typo_in_model_name_is_rejected() {
        let result = ModelManager::new(&routing(&[], &[("fast", &["creativ"])]), "key");
        assert_eq!(
            result.unwrap_err(),
            ConfigError::UnknownModel("creativ".to_string())
        );
    }

    #[test]
    fn test_unregistered_model_is_rejected() {
        let mut config = routing(&[("swot_analysis", "precise")], &[]);
        config.models = BTreeMap::from([("fast".to_string(), "backend-fast".to_string())]);

        let result = ModelManager::new(&config, "key");
        assert_eq!(
            result.unwrap_err(),
            ConfigError::UnregisteredModel("precise".to_string())
        );
    }

    #[test]
    fn test_default_routing_is_valid() {
        let manager = ModelManager::new(&RoutingConfig::default(), "key").unwrap();

        assert_eq!(manager.registered_models().len(), 4);
        assert_eq!(
            manager.get_model_for_task(TaskType::ExecutiveSummary),
            LogicalModel::Creative
        );
        assert_eq!(
            manager.get_model_for_task(TaskType::DataCollection),
            LogicalModel::Fast
        );
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let manager = ModelManager::new(&RoutingConfig::default(), "sk-secret").unwrap();
        let debug = format!("{:?}", manager);

        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("<redacted>"));
    }
}
