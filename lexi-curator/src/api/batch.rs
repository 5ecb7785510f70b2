//! Batch API handlers
//!
//! POST /batch/start, GET /batch/:id, POST /batch/:id/{pause,resume,stop}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use lexi_common::events::ProgressSnapshot;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult, WordFailure};
use crate::models::{BatchConfig, BatchSession, BatchState, VocabularyItem};
use crate::services::BatchControl;
use crate::{AppState, BatchHandle};

/// POST /batch/start request
#[derive(Debug, Deserialize)]
pub struct StartBatchRequest {
    pub items: Vec<VocabularyItem>,
    /// Server defaults apply when absent
    #[serde(default)]
    pub config: Option<BatchConfig>,
}

/// POST /batch/start response
#[derive(Debug, Serialize, Deserialize)]
pub struct StartBatchResponse {
    pub batch_id: Uuid,
    pub state: BatchState,
    pub submitted: usize,
    pub vision_model: Option<String>,
}

/// GET /batch/:id response
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchStatusResponse {
    pub batch_id: Uuid,
    pub state: BatchState,
    pub dry_run: bool,
    pub progress: ProgressSnapshot,
    pub failures: Vec<WordFailure>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl From<&BatchSession> for BatchStatusResponse {
    fn from(session: &BatchSession) -> Self {
        Self {
            batch_id: session.batch_id,
            state: session.state,
            dry_run: session.config.dry_run,
            progress: session.progress.clone(),
            failures: session.failures.clone(),
            started_at: session.started_at,
            ended_at: session.ended_at,
        }
    }
}

/// Response to pause / resume / stop
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchControlResponse {
    pub batch_id: Uuid,
    /// State at the time of the request; the change lands at the next word boundary
    pub state: BatchState,
    pub requested: String,
}

/// POST /batch/start
///
/// Checks the search and scoring backends first, then runs the batch in the
/// background. Returns 202 with the batch id.
pub async fn start_batch(
    State(state): State<AppState>,
    Json(request): Json<StartBatchRequest>,
) -> ApiResult<(StatusCode, Json<StartBatchResponse>)> {
    let config = request.config.unwrap_or_else(|| state.batch_defaults.clone());
    if config.candidates_per_word == 0 {
        return Err(ApiError::BadRequest("candidates_per_word must be at least 1".to_string()));
    }
    if config.min_relevance > 10 || config.min_score > 40 {
        return Err(ApiError::BadRequest(
            "min_score must be 0-40 and min_relevance 0-10".to_string(),
        ));
    }

    let session = BatchSession::new(config.clone());
    let batch_id = session.batch_id;
    let handle = BatchHandle {
        control: BatchControl::new(),
        session: Arc::new(RwLock::new(session)),
    };
    reserve_slot(&state, batch_id, handle.clone()).await?;

    let vision_model = match state.orchestrator.initialize(&config).await {
        Ok(model) => model,
        Err(e) => {
            state.batches.write().await.remove(&batch_id);
            state.record_error(e.to_string()).await;
            return Err(e.into());
        }
    };

    let submitted = request.items.len();
    tracing::info!(batch_id = %batch_id, submitted, "Batch accepted");

    let task_state = state.clone();
    tokio::spawn(async move {
        let control = handle.control.clone();
        let result = task_state
            .orchestrator
            .run_session(request.items, handle.session, handle.control)
            .await;
        if let Err(e) = result {
            // A batch that never left Idle must not block the next start
            control.stop();
            tracing::error!(batch_id = %batch_id, error = %e, "Batch task failed");
            task_state.record_error(e.to_string()).await;
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(StartBatchResponse {
            batch_id,
            state: BatchState::Idle,
            submitted,
            vision_model,
        }),
    ))
}

/// GET /batch/:id
pub async fn get_batch_status(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> ApiResult<Json<BatchStatusResponse>> {
    let handle = find_batch(&state, batch_id).await?;
    let mut session = handle.session.write().await;
    session.update_elapsed();
    Ok(Json(BatchStatusResponse::from(&*session)))
}

/// POST /batch/:id/pause
pub async fn pause_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> ApiResult<Json<BatchControlResponse>> {
    control_batch(&state, batch_id, "pause", BatchControl::pause).await
}

/// POST /batch/:id/resume
pub async fn resume_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> ApiResult<Json<BatchControlResponse>> {
    control_batch(&state, batch_id, "resume", BatchControl::resume).await
}

/// POST /batch/:id/stop
pub async fn stop_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> ApiResult<Json<BatchControlResponse>> {
    control_batch(&state, batch_id, "stop", BatchControl::stop).await
}

async fn control_batch(
    state: &AppState,
    batch_id: Uuid,
    requested: &str,
    apply: fn(&BatchControl),
) -> ApiResult<Json<BatchControlResponse>> {
    let handle = find_batch(state, batch_id).await?;
    let current = handle.session.read().await.state;
    if current.is_terminal() {
        return Err(ApiError::Conflict(format!(
            "Batch {} already {}",
            batch_id,
            current.as_str()
        )));
    }

    apply(&handle.control);
    tracing::info!(batch_id = %batch_id, requested, "Batch control requested");

    Ok(Json(BatchControlResponse {
        batch_id,
        state: current,
        requested: requested.to_string(),
    }))
}

async fn find_batch(state: &AppState, batch_id: Uuid) -> ApiResult<BatchHandle> {
    state
        .batches
        .read()
        .await
        .get(&batch_id)
        .cloned()
        .ok_or_else(|| ApiError::NotFound(format!("Batch not found: {}", batch_id)))
}

/// Claim the single batch slot for `batch_id`
///
/// Check and insert happen under one write lock. Finished batches are
/// dropped from the map here.
async fn reserve_slot(state: &AppState, batch_id: Uuid, handle: BatchHandle) -> ApiResult<()> {
    let mut batches = state.batches.write().await;

    let mut finished = Vec::new();
    for (id, existing) in batches.iter() {
        let current = existing.session.read().await.state;
        if is_finished(current, &existing.control) {
            finished.push(*id);
        } else if !existing.control.is_stopped() {
            return Err(ApiError::Conflict("A batch is already running".to_string()));
        }
    }
    for id in finished {
        batches.remove(&id);
    }

    batches.insert(batch_id, handle);
    Ok(())
}

/// Terminal, or stopped before it ever ran
fn is_finished(state: BatchState, control: &BatchControl) -> bool {
    state.is_terminal() || (state == BatchState::Idle && control.is_stopped())
}

/// Build batch routes
pub fn batch_routes() -> Router<AppState> {
    Router::new()
        .route("/batch/start", post(start_batch))
        .route("/batch/:id", get(get_batch_status))
        .route("/batch/:id/pause", post(pause_batch))
        .route("/batch/:id/resume", post(resume_batch))
        .route("/batch/:id/stop", post(stop_batch))
}
