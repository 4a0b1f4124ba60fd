//! Health check handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness probe).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

const READY_PROBE: &str = ".ready-probe";

/// Readiness check endpoint. Ready when the jobs directory is writable.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let probe = state.store().root().join(READY_PROBE);
    let result = match tokio::fs::write(&probe, b"ok").await {
        Ok(()) => tokio::fs::remove_file(&probe).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => Ok(Json(ReadinessResponse {
            status: "ready".to_string(),
            error: None,
        })),
        Err(e) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready".to_string(),
                error: Some(format!("jobs directory not writable: {}", e)),
            }),
        )),
    }
}
