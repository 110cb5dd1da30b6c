use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::error::{ApiError, ApiResult};
use crate::llm::{LogicalModel, UsageSnapshot};
use crate::research::ResearchRequest;
use crate::service::ResearchService;
use crate::store::{ResearchProgress, ResearchRecord, ResearchStatus};

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    /// Only runs requested by this user
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub filename: String,
    /// Document type folder; omitted uploads are stored but not indexed
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisteredModel {
    pub model: LogicalModel,
    pub backend_model: String,
}

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    #[serde(flatten)]
    pub usage: UsageSnapshot,
    pub default_model: LogicalModel,
    pub models: Vec<RegisteredModel>,
}

fn default_limit() -> usize {
    10
}

/// 状态查询响应，不含报告正文
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub research_id: String,
    pub status: ResearchStatus,
    pub research_topic: String,
    pub progress: ResearchProgress,
    pub error: Option<String>,
}

impl From<ResearchRecord> for StatusResponse {
    fn from(record: ResearchRecord) -> Self {
        Self {
            research_id: record.id,
            status: record.status,
            research_topic: record.request.research_topic,
            progress: record.progress,
            error: record.error,
        }
    }
}

fn find(service: &ResearchService, id: &str) -> ApiResult<ResearchRecord> {
    service
        .store()
        .get(id)
        .ok_or_else(|| ApiError::NotFound(format!("research {}", id)))
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// POST /research/start
pub async fn start_research(
    State(service): State<ResearchService>,
    Json(request): Json<ResearchRequest>,
) -> ApiResult<impl IntoResponse> {
    if request.research_topic.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "research_topic must not be empty".to_string(),
        ));
    }
    if request.research_request.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "research_request must not be empty".to_string(),
        ));
    }

    let record = service.start(request);
    info!("📨 收到研究请求: {}", record.id);
    Ok((StatusCode::ACCEPTED, Json(StatusResponse::from(record))))
}

/// GET /research/history
pub async fn research_history(
    State(service): State<ResearchService>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let (total, records) =
        service
            .store()
            .history(query.user_id.as_deref(), query.limit, query.offset);
    let items: Vec<StatusResponse> = records.into_iter().map(StatusResponse::from).collect();

    Json(json!({
        "total": total,
        "limit": query.limit,
        "offset": query.offset,
        "items": items,
    }))
}

/// GET /research/:id/status
pub async fn research_status(
    State(service): State<ResearchService>,
    Path(id): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    Ok(Json(find(&service, &id)?.into()))
}

/// GET /research/:id/result
pub async fn research_result(
    State(service): State<ResearchService>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let record = find(&service, &id)?;
    if record.status != ResearchStatus::Completed {
        return Err(ApiError::BadRequest(format!(
            "research {} is not completed",
            id
        )));
    }

    Ok(Json(json!({
        "research_id": record.id,
        "research_topic": record.request.research_topic,
        "result": record.result,
        "report_path": record.report_path,
        "completed_at": record.completed_at,
    })))
}

/// DELETE /research/:id
pub async fn delete_research(
    State(service): State<ResearchService>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    service
        .store()
        .delete(&id)
        .ok_or_else(|| ApiError::NotFound(format!("research {}", id)))?;
    info!("🗑️ 已删除研究记录: {}", id);
    Ok(Json(json!({ "deleted": id })))
}

/// GET /knowledge/stats
pub async fn knowledge_stats(State(service): State<ResearchService>) -> impl IntoResponse {
    match service.knowledge_stats() {
        Some(stats) => Json(json!({ "enabled": true, "stats": stats })),
        None => Json(json!({ "enabled": false })),
    }
}

/// POST /knowledge/upload?filename=..&category=..
pub async fn upload_knowledge(
    State(service): State<ResearchService>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let uploaded = service
        .upload_knowledge(&query.filename, query.category.as_deref(), &body)
        .await?;
    Ok(Json(uploaded))
}

/// GET /knowledge/files
pub async fn knowledge_files(State(service): State<ResearchService>) -> ApiResult<impl IntoResponse> {
    Ok(Json(service.knowledge_files()?))
}

/// DELETE /knowledge/files/:filename
pub async fn delete_knowledge_file(
    State(service): State<ResearchService>,
    Path(filename): Path<String>,
) -> ApiResult<impl IntoResponse> {
    if !service.delete_knowledge_file(&filename)? {
        return Err(ApiError::NotFound(format!("file {}", filename)));
    }
    Ok(Json(json!({
        "message": format!("File {} deleted successfully", filename),
    })))
}

/// POST /knowledge/reindex
pub async fn reindex_knowledge(
    State(service): State<ResearchService>,
) -> ApiResult<impl IntoResponse> {
    let stats = service.reindex_knowledge()?;
    Ok(Json(json!({
        "message": "Knowledge base reindexed successfully",
        "stats": stats,
    })))
}

/// GET /llm/usage
pub async fn llm_usage(State(service): State<ResearchService>) -> impl IntoResponse {
    let manager = service.client().model_manager();
    Json(UsageResponse {
        usage: service.usage(),
        default_model: manager.default_model(),
        models: manager
            .registered_models()
            .into_iter()
            .map(|(model, backend_model)| RegisteredModel {
                model,
                backend_model: backend_model.to_string(),
            })
            .collect(),
    })
}

/// GET /llm/routing/:task
///
/// Unknown task names resolve to the default model.
pub async fn llm_routing(
    State(service): State<ResearchService>,
    Path(task): Path<String>,
) -> impl IntoResponse {
    let manager = service.client().model_manager();
    let model = manager.model_for_task_name(&task);
    Json(json!({
        "task": task,
        "model": model,
        "backend_model": manager.backend_model(model),
        "fallback_chain": manager.get_fallback_chain(model),
    }))
}
