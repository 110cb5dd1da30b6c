#[cfg(test)]
mod tests {
    use crate::config::{
        CacheConfig, Config, ConfigError, LLMConfig, LLMProvider, RateLimitConfig, RoutingConfig,
    };
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.output_path, PathBuf::from("./reports"));
        assert_eq!(config.pipeline.max_execution_seconds, 3600);
        assert_eq!(config.server.bind, "127.0.0.1:8000");
        assert!(config.knowledge.enabled);
        assert_eq!(config.knowledge.max_results, 3);
        assert_eq!(config.knowledge.snippet_chars, 800);
        assert!(!config.verbose);
    }

    #[test]
    fn test_llm_provider_default() {
        let provider = LLMProvider::default();
        assert_eq!(provider, LLMProvider::Gemini);
    }

    #[test]
    fn test_llm_provider_from_str() {
        assert_eq!(
            "gemini".parse::<LLMProvider>().unwrap(),
            LLMProvider::Gemini
        );
        assert_eq!(
            "OpenAI".parse::<LLMProvider>().unwrap(),
            LLMProvider::OpenAI
        );
        assert_eq!(
            "anthropic".parse::<LLMProvider>().unwrap(),
            LLMProvider::Anthropic
        );
        assert_eq!(
            "deepseek".parse::<LLMProvider>().unwrap(),
            LLMProvider::DeepSeek
        );
        assert_eq!(
            "openrouter".parse::<LLMProvider>().unwrap(),
            LLMProvider::OpenRouter
        );
        assert_eq!(
            "ollama".parse::<LLMProvider>().unwrap(),
            LLMProvider::Ollama
        );

        assert!("invalid".parse::<LLMProvider>().is_err());
    }

    #[test]
    fn test_llm_provider_display_round_trips_through_from_str() {
        for provider in [
            LLMProvider::Gemini,
            LLMProvider::OpenAI,
            LLMProvider::Anthropic,
            LLMProvider::DeepSeek,
            LLMProvider::OpenRouter,
            LLMProvider::Ollama,
        ] {
            assert_eq!(
                provider.to_string().parse::<LLMProvider>().unwrap(),
                provider
            );
        }
    }

    #[test]
    fn test_llm_config_default() {
        let config = LLMConfig::default();

        assert_eq!(config.provider, LLMProvider::Gemini);
        assert_eq!(config.api_key_env, "GEMINI_API_KEY");
        assert!(config.api_key.is_none());
        assert_eq!(config.retry_attempts, 2);
        assert_eq!(config.retry_delay_ms, 2000);
        assert_eq!(config.rate_limit_backoff_ms, 30_000);
        assert_eq!(config.timeout_seconds, 120);
    }

    #[test]
    fn test_rate_limit_and_cache_defaults() {
        let limits = RateLimitConfig::default();
        assert_eq!(limits.requests_per_minute, 15);
        assert_eq!(limits.requests_per_day, 1500);

        let cache = CacheConfig::default();
        assert!(cache.enabled);
        assert_eq!(cache.cache_dir, PathBuf::from(".marketresearch/cache"));
        assert_eq!(cache.expire_hours, 24);
    }

    #[test]
    fn test_routing_default_covers_every_model_in_chains() {
        let routing = RoutingConfig::default();

        for (model, chain) in &routing.fallback_chains {
            assert!(routing.models.contains_key(model));
            assert!(!chain.contains(model), "{} falls back to itself", model);
            for alternative in chain {
                assert!(routing.models.contains_key(alternative));
            }
        }
        for model in routing.task_models.values() {
            assert!(routing.models.contains_key(model));
        }
        assert_eq!(routing.task_models["swot_analysis"], "precise");
    }

    #[test]
    fn test_resolve_api_key_prefers_explicit_key() {
        let config = LLMConfig {
            api_key: Some("sk-test".to_string()),
            api_key_env: "MARKETRESEARCH_TEST_UNSET_VAR".to_string(),
            ..Default::default()
        };

        assert_eq!(config.resolve_api_key().unwrap(), "sk-test");
    }

    #[test]
    fn test_resolve_api_key_missing_is_fatal() {
        let config = LLMConfig {
            api_key: Some("   ".to_string()),
            api_key_env: "MARKETRESEARCH_TEST_SURELY_UNSET_VAR".to_string(),
            ..Default::default()
        };

        assert_eq!(
            config.resolve_api_key(),
            Err(ConfigError::MissingCredential(
                "MARKETRESEARCH_TEST_SURELY_UNSET_VAR".to_string()
            ))
        );
    }

    #[test]
    fn test_config_from_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("marketresearch.toml");
        let content = r#"
output_path = "/tmp/reports"

[llm]
provider = "openai"
api_key_env = "OPENAI_API_KEY"

[rate_limit]
requests_per_minute = 2

[routing.task_models]
swot_analysis = "fast"
"#;
        std::fs::write(&config_path, content).unwrap();

        let config = Config::from_file(&config_path).unwrap();

        assert_eq!(config.output_path, PathBuf::from("/tmp/reports"));
        assert_eq!(config.llm.provider, LLMProvider::OpenAI);
        assert_eq!(config.llm.api_key_env, "OPENAI_API_KEY");
        // unspecified fields keep their defaults
        assert_eq!(config.llm.retry_attempts, 2);
        assert_eq!(config.rate_limit.requests_per_minute, 2);
        assert_eq!(config.rate_limit.requests_per_day, 1500);
        assert_eq!(config.routing.task_models.len(), 1);
        assert_eq!(config.routing.default_model, "fast");
    }

    #[test]
    fn test_config_from_missing_file() {
        let result = Config::from_file(&PathBuf::from("/nonexistent/marketresearch.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_config_from_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("broken.toml");
        std::fs::write(&config_path, "rate_limit = [").unwrap();

        assert!(Config::from_file(&config_path).is_err());
    }
}
