//! Synchronization control handlers
//!
//! POST /sync/start, GET /sync/status

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    services::SyncReport,
    AppState,
};

/// POST /sync/start response
#[derive(Debug, Serialize, Deserialize)]
pub struct StartSyncResponse {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub genres: Vec<String>,
}

/// GET /sync/status response
#[derive(Debug, Serialize, Deserialize)]
pub struct SyncStatusResponse {
    pub running: bool,
    pub last_report: Option<SyncReport>,
}

/// POST /sync/start
///
/// Begin a background run. Returns 202 Accepted with the run id, or 409 if
/// a run is already active.
pub async fn start_sync(
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<StartSyncResponse>)> {
    let run = state
        .start_sync()
        .ok_or_else(|| ApiError::Conflict("Synchronization already running".to_string()))?;

    tracing::info!(run_id = %run.run_id, "Synchronization started via API");

    Ok((
        StatusCode::ACCEPTED,
        Json(StartSyncResponse {
            run_id: run.run_id,
            started_at: run.started_at,
            genres: state.orchestrator.genres().to_vec(),
        }),
    ))
}

/// GET /sync/status
pub async fn sync_status(State(state): State<AppState>) -> Json<SyncStatusResponse> {
    Json(SyncStatusResponse {
        running: state.sync.is_running(),
        last_report: state.sync.last_report().await,
    })
}

/// Build synchronization routes
pub fn sync_routes() -> Router<AppState> {
    Router::new()
        .route("/sync/start", post(start_sync))
        .route("/sync/status", get(sync_status))
}
