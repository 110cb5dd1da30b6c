use anyhow::Result;
use clap::Parser;
use marketresearch_rs::api;
use marketresearch_rs::cli::{Args, Command};
use marketresearch_rs::service::ResearchService;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.to_config()?;

    let default_level = if config.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let service = ResearchService::from_config(&config)?;

    match &args.command {
        Command::Run { .. } => {
            let Some(request) = args.research_request() else {
                return Ok(());
            };
            service.check_connection().await?;
            let result = service.run(request).await?;
            info!(
                "📄 研究报告已生成: {} (缓存: {})",
                result.report_path.display(),
                result.from_cache
            );
            Ok(())
        }
        Command::Serve { .. } => api::serve(service, &config.server.bind).await,
    }
}
