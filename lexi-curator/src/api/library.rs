//! Curation library API handlers
//!
//! Record browsing and operator overrides (select / reject / verify /
//! delete), library and queue statistics, activity feed, cache and GPU
//! status.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ApiError, ApiResult};
use crate::models::{
    ActivityEntry, AuditEntry, CurationRecord, CurationStatus, LibraryStatistics, QueueStats,
    RecordFilter,
};
use crate::services::{GateStatus, StorageStats};
use crate::AppState;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 500;
const DEFAULT_OPERATOR: &str = "api";

/// GET /records query string
#[derive(Debug, Default, Deserialize)]
pub struct RecordsQuery {
    pub word: Option<String>,
    pub lesson_id: Option<String>,
    pub category: Option<String>,
    pub status: Option<CurationStatus>,
    pub provider: Option<String>,
    pub min_score: Option<i64>,
    pub verified: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordsResponse {
    pub records: Vec<CurationRecord>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct OperatorRequest {
    /// Operator name; recorded as `admin:<name>`
    pub operator: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
    pub operator: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub verified_by: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LibraryStatsResponse {
    pub records: LibraryStatistics,
    pub storage: StorageStats,
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheClearResponse {
    pub cleared: usize,
}

fn operator_actor(operator: Option<&str>) -> String {
    let name = operator
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .unwrap_or(DEFAULT_OPERATOR);
    format!("admin:{}", name)
}

async fn load_record(state: &AppState, id: i64) -> ApiResult<CurationRecord> {
    state
        .orchestrator
        .store()
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Record not found: {}", id)))
}

/// GET /records
pub async fn list_records(
    State(state): State<AppState>,
    Query(query): Query<RecordsQuery>,
) -> ApiResult<Json<RecordsResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0).max(0);
    let filter = RecordFilter {
        word: query.word,
        lesson_id: query.lesson_id,
        category: query.category,
        status: query.status,
        provider: query.provider,
        min_score: query.min_score,
        verified: query.verified,
    };

    let (records, total) = state.orchestrator.store().search(&filter, limit, offset).await?;
    Ok(Json(RecordsResponse {
        records,
        total,
        limit,
        offset,
    }))
}

/// GET /records/:id
pub async fn get_record(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<CurationRecord>> {
    Ok(Json(load_record(&state, id).await?))
}

/// GET /records/:id/history
///
/// Audit rows outlive the record, so a deleted record still has history.
pub async fn get_history(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Vec<AuditEntry>>> {
    let history = state.orchestrator.store().history(id).await?;
    if history.is_empty() {
        return Err(ApiError::NotFound(format!("No history for record {}", id)));
    }
    Ok(Json(history))
}

/// POST /records/:id/select
///
/// Operator override; the word's previous selection is demoted.
pub async fn select_record(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Option<Json<OperatorRequest>>,
) -> ApiResult<Json<CurationRecord>> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let actor = operator_actor(request.operator.as_deref());

    if !state.orchestrator.store().select(id, &actor).await? {
        return Err(ApiError::NotFound(format!("Record not found: {}", id)));
    }
    tracing::info!(record_id = id, actor = %actor, "Record selected by operator");
    Ok(Json(load_record(&state, id).await?))
}

/// POST /records/:id/reject
pub async fn reject_record(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<RejectRequest>,
) -> ApiResult<Json<CurationRecord>> {
    if request.reason.trim().is_empty() {
        return Err(ApiError::BadRequest("reason must not be empty".to_string()));
    }
    let actor = operator_actor(request.operator.as_deref());

    if !state.orchestrator.store().reject(id, &request.reason, &actor).await? {
        return Err(ApiError::NotFound(format!("Record not found: {}", id)));
    }
    tracing::info!(record_id = id, actor = %actor, "Record rejected by operator");
    Ok(Json(load_record(&state, id).await?))
}

/// POST /records/:id/verify
pub async fn verify_record(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<VerifyRequest>,
) -> ApiResult<Json<CurationRecord>> {
    if request.verified_by.trim().is_empty() {
        return Err(ApiError::BadRequest("verified_by must not be empty".to_string()));
    }
    if !state.orchestrator.store().verify(id, request.verified_by.trim()).await? {
        return Err(ApiError::NotFound(format!("Record not found: {}", id)));
    }
    Ok(Json(load_record(&state, id).await?))
}

/// DELETE /records/:id
///
/// Removes the record and, if downloaded, its image and sidecar.
pub async fn delete_record(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Option<Json<OperatorRequest>>,
) -> ApiResult<Json<serde_json::Value>> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let actor = operator_actor(request.operator.as_deref());
    let record = load_record(&state, id).await?;

    if !state.orchestrator.store().delete(id, &actor).await? {
        return Err(ApiError::NotFound(format!("Record not found: {}", id)));
    }

    let mut asset_removed = false;
    if let Some(path) = record.local_path.as_deref().filter(|p| !p.is_empty()) {
        asset_removed = state
            .orchestrator
            .services()
            .assets
            .delete(&PathBuf::from(path))
            .await?;
    }

    tracing::info!(record_id = id, word = %record.word, actor = %actor, "Record deleted");
    Ok(Json(serde_json::json!({
        "deleted": id,
        "asset_removed": asset_removed,
    })))
}

/// GET /library/stats
pub async fn library_stats(State(state): State<AppState>) -> ApiResult<Json<LibraryStatsResponse>> {
    let services = state.orchestrator.services();
    let records = services.store.statistics().await?;
    let storage = services.assets.stats().await?;
    Ok(Json(LibraryStatsResponse { records, storage }))
}

/// GET /queue/stats
pub async fn queue_stats(State(state): State<AppState>) -> ApiResult<Json<QueueStats>> {
    Ok(Json(state.orchestrator.store().queue_stats().await?))
}

/// GET /activity
pub async fn recent_activity(
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
) -> ApiResult<Json<Vec<ActivityEntry>>> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    Ok(Json(state.orchestrator.store().recent_activity(limit).await?))
}

/// POST /cache/clear
pub async fn clear_cache(State(state): State<AppState>) -> ApiResult<Json<CacheClearResponse>> {
    let cleared = match &state.orchestrator.services().cache {
        Some(cache) => cache.clear().await?,
        None => 0,
    };
    tracing::info!(cleared, "Result cache cleared");
    Ok(Json(CacheClearResponse { cleared }))
}

/// GET /gpu
pub async fn gpu_status(State(state): State<AppState>) -> Json<GateStatus> {
    Json(state.orchestrator.services().scorer.gate().status().await)
}

/// Build library routes
pub fn library_routes() -> Router<AppState> {
    Router::new()
        .route("/records", get(list_records))
        .route("/records/:id", get(get_record).delete(delete_record))
        .route("/records/:id/history", get(get_history))
        .route("/records/:id/select", post(select_record))
        .route("/records/:id/reject", post(reject_record))
        .route("/records/:id/verify", post(verify_record))
        .route("/library/stats", get(library_stats))
        .route("/queue/stats", get(queue_stats))
        .route("/activity", get(recent_activity))
        .route("/cache/clear", post(clear_cache))
        .route("/gpu", get(gpu_status))
}
