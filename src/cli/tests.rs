#[cfg(test)]
mod tests {
    use crate::cli::{Args, Command};
    use crate::config::LLMProvider;
    use clap::Parser;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_run_subcommand() {
        let args = Args::try_parse_from([
            "marketresearch-rs",
            "run",
            "-t",
            "EV charging",
            "-r",
            "US market outlook",
            "--company",
            "ChargePoint",
        ])
        .unwrap();

        assert_eq!(
            args.command,
            Command::Run {
                topic: "EV charging".to_string(),
                request: "US market outlook".to_string(),
                company: Some("ChargePoint".to_string()),
                industry: None,
            }
        );
        let request = args.research_request().unwrap();
        assert_eq!(request.research_topic, "EV charging");
        assert_eq!(request.company_name.as_deref(), Some("ChargePoint"));
        assert_eq!(request.user_id, "default");
    }

    #[test]
    fn test_run_requires_topic_and_request() {
        assert!(Args::try_parse_from(["marketresearch-rs", "run", "-t", "EV"]).is_err());
        assert!(Args::try_parse_from(["marketresearch-rs"]).is_err());
    }

    #[test]
    fn test_serve_subcommand_overrides_bind() {
        let args = Args::try_parse_from([
            "marketresearch-rs",
            "serve",
            "--bind",
            "0.0.0.0:9000",
            "--no-cache",
        ])
        .unwrap();

        assert!(args.research_request().is_none());
        let config = args.to_config().unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert!(!config.cache.enabled);
    }

    #[test]
    fn test_global_overrides() {
        let args = Args::try_parse_from([
            "marketresearch-rs",
            "serve",
            "-v",
            "-o",
            "/tmp/reports",
            "--llm-provider",
            "openai",
            "--llm-api-key",
            "test-key",
            "--llm-api-base-url",
            "https://api.openai.com",
            "--max-tokens",
            "2048",
            "--temperature",
            "0.3",
            "--requests-per-minute",
            "5",
            "--requests-per-day",
            "100",
            "--no-knowledge",
        ])
        .unwrap();

        let config = args.to_config().unwrap();
        assert!(config.verbose);
        assert_eq!(config.output_path, PathBuf::from("/tmp/reports"));
        assert_eq!(config.llm.provider, LLMProvider::OpenAI);
        assert_eq!(config.llm.api_key.as_deref(), Some("test-key"));
        assert_eq!(
            config.llm.api_base_url.as_deref(),
            Some("https://api.openai.com")
        );
        assert_eq!(config.llm.max_tokens, 2048);
        assert_eq!(config.llm.temperature, 0.3);
        assert_eq!(config.rate_limit.requests_per_minute, 5);
        assert_eq!(config.rate_limit.requests_per_day, 100);
        assert!(!config.knowledge.enabled);
    }

    #[test]
    fn test_unknown_provider_is_an_error() {
        let args = Args::try_parse_from([
            "marketresearch-rs",
            "serve",
            "--llm-provider",
            "mistral",
        ])
        .unwrap();

        assert!(args.to_config().is_err());
    }

    #[test]
    fn test_explicit_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[rate_limit]\nrequests_per_minute = 3\nrequests_per_day = 30\n",
        )
        .unwrap();

        let args = Args::try_parse_from([
            "marketresearch-rs",
            "serve",
            "--config",
            path.to_str().unwrap(),
            "--requests-per-day",
            "40",
        ])
        .unwrap();

        let config = args.to_config().unwrap();
        assert_eq!(config.rate_limit.requests_per_minute, 3);
        assert_eq!(config.rate_limit.requests_per_day, 40);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let args = Args::try_parse_from([
            "marketresearch-rs",
            "serve",
            "-c",
            "/definitely/not/here.toml",
        ])
        .unwrap();

        assert!(args.to_config().is_err());
    }
}
