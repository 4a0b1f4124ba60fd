//! Job status, result and thumbnail handlers.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use accel_models::{Category, JobId, JobStage, Progress};
use accel_storage::JobHandle;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Resolve a job id from the path, 404 when unknown.
async fn resolve(state: &AppState, raw: &str) -> ApiResult<JobHandle> {
    let id = JobId::parse(raw).map_err(|_| ApiError::not_found(format!("job {}", raw)))?;
    let store = state.store();
    if !store.exists(&id).await {
        return Err(ApiError::not_found(format!("job {}", id)));
    }
    Ok(store.handle(&id))
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub stage: JobStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    pub percent: u8,
    /// Whether the job currently holds the accelerator
    pub in_flight: bool,
    pub terminal: bool,
    pub updated_at: DateTime<Utc>,
}

/// Current status of a job. Reads never fail once the job exists.
pub async fn get_job_status(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<Json<JobStatusResponse>> {
    let handle = resolve(&state, &job_id).await?;
    let status = state.queue.status();
    let record = status.read_status(&handle).await;
    let terminal = status.is_terminal(&handle).await;

    Ok(Json(JobStatusResponse {
        job_id: handle.id().clone(),
        percent: if record.stage == JobStage::Finished { 100 } else { record.percent() },
        in_flight: !terminal && record.stage.is_in_flight(),
        stage: record.stage,
        note: record.note,
        progress: record.progress,
        terminal,
        updated_at: record.updated_at,
    }))
}

pub async fn get_image_result(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<Response> {
    get_result(state, Category::Image, &job_id).await
}

pub async fn get_video_result(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<Response> {
    get_result(state, Category::Video, &job_id).await
}

/// Output payload of a finished job.
async fn get_result(state: AppState, category: Category, raw: &str) -> ApiResult<Response> {
    let handle = resolve(&state, raw).await?;
    let store = state.store();
    let meta = store.read_metadata(&handle).await?;
    if meta.category != category {
        return Err(ApiError::not_found(format!("{} job {}", category, meta.id)));
    }

    let status = state.queue.status();
    if !status.is_terminal(&handle).await {
        let stage = status.read_status(&handle).await.stage;
        return Err(ApiError::conflict(format!("job {} is still {}", meta.id, stage)));
    }
    if let Some(message) = status.error_message(&handle).await {
        return Err(ApiError::ProcessingFailed {
            job_id: meta.id,
            message,
        });
    }

    let Some((_, data)) = store.read_output(&handle).await? else {
        return Err(ApiError::not_found(format!("output of job {}", meta.id)));
    };

    let disposition = format!(
        "inline; filename=\"{}.{}\"",
        meta.id,
        category.output_file_name().rsplit('.').next().unwrap_or("bin")
    );
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, category.output_content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        data,
    )
        .into_response())
}

pub async fn get_thumbnail(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<Response> {
    let handle = resolve(&state, &job_id).await?;
    let thumb = state
        .store()
        .read_thumbnail(&handle)
        .await
        .ok_or_else(|| ApiError::not_found(format!("thumbnail of job {}", handle.id())))?;

    Ok(([(header::CONTENT_TYPE, "image/jpeg")], thumb).into_response())
}
