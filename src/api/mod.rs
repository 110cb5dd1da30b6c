//! HTTP API

use anyhow::{Context, Result};
use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::service::ResearchService;

pub mod error;
pub mod handlers;

pub use error::{ApiError, ApiErrorResponse, ApiResult};

pub fn create_router(service: ResearchService) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/research/start", post(handlers::start_research))
        .route("/research/history", get(handlers::research_history))
        .route("/research/:id/status", get(handlers::research_status))
        .route("/research/:id/result", get(handlers::research_result))
        .route("/research/:id", delete(handlers::delete_research))
        .route("/knowledge/stats", get(handlers::knowledge_stats))
        .route("/knowledge/upload", post(handlers::upload_knowledge))
        .route("/knowledge/files", get(handlers::knowledge_files))
        .route(
            "/knowledge/files/:filename",
            delete(handlers::delete_knowledge_file),
        )
        .route("/knowledge/reindex", post(handlers::reindex_knowledge))
        .route("/llm/usage", get(handlers::llm_usage))
        .route("/llm/routing/:task", get(handlers::llm_routing))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// 启动HTTP服务
pub async fn serve(service: ResearchService, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("🌐 HTTP服务已启动: http://{}", bind);

    axum::serve(listener, create_router(service))
        .await
        .context("HTTP server stopped unexpectedly")
}
