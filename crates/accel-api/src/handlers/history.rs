//! History listing and clearing.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::info;

use accel_models::HistoryEntry;

use crate::error::ApiResult;
use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub jobs: Vec<HistoryEntry>,
}

/// Terminal jobs, newest first.
pub async fn list_history(State(state): State<AppState>) -> ApiResult<Json<HistoryResponse>> {
    let jobs = state.retention.history(state.config.history_limit).await?;
    Ok(Json(HistoryResponse { jobs }))
}

#[derive(Debug, Serialize)]
pub struct ClearHistoryResponse {
    pub deleted: usize,
}

/// Delete every terminal job. Pending and in-flight jobs are kept.
pub async fn clear_history(State(state): State<AppState>) -> ApiResult<Json<ClearHistoryResponse>> {
    let deleted = state.retention.clear_terminal().await?;
    metrics::record_history_cleared(deleted);
    info!("Cleared {} terminal jobs", deleted);
    Ok(Json(ClearHistoryResponse { deleted }))
}
