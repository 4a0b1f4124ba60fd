//! Submission handlers.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;
use tracing::warn;

use accel_models::{Category, HistoryEntry, JobId, Operation, Timing};

use crate::error::{ApiError, ApiResult};
use crate::services::{render_reference, Admission};
use crate::state::AppState;

/// Raw multipart fields of a submission.
#[derive(Debug, Default)]
struct SubmissionForm {
    file_name: Option<String>,
    payload: Vec<u8>,
    filter: Option<String>,
    factor: Option<String>,
    compare: bool,
}

impl SubmissionForm {
    async fn read(category: Category, mut multipart: Multipart) -> ApiResult<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or("").to_string();
            match name.as_str() {
                n if n == category.as_str() => {
                    form.file_name = field.file_name().map(str::to_string);
                    form.payload = field.bytes().await.map_err(multipart_error)?.to_vec();
                }
                "filter" => form.filter = Some(field.text().await.map_err(multipart_error)?),
                "factor" => form.factor = Some(field.text().await.map_err(multipart_error)?),
                "compare" => {
                    let text = field.text().await.map_err(multipart_error)?;
                    form.compare = matches!(text.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on");
                }
                _ => {} // ignore unknown fields
            }
        }

        Ok(form)
    }
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::bad_request(e.body_text())
    }
}

/// Synchronous result of an image job.
#[derive(Debug, Serialize)]
pub struct CompletedResponse {
    pub job_id: JobId,
    pub status: &'static str,
    /// Base64 JPEG
    pub hw_image: String,
    pub hw_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hw_time_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sw_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sw_time: Option<String>,
}

/// Acknowledgment for a job left in the queue.
#[derive(Debug, Serialize)]
pub struct QueuedResponse {
    pub job_id: JobId,
    pub status: &'static str,
    pub status_url: String,
    pub result_url: String,
}

impl QueuedResponse {
    pub fn new(category: Category, job_id: JobId) -> Self {
        Self {
            status_url: format!("/api/jobs/{}/status", job_id),
            result_url: HistoryEntry::download_path(category, &job_id),
            job_id,
            status: "queued",
        }
    }
}

pub async fn submit_image_grayscale(State(state): State<AppState>, multipart: Multipart) -> ApiResult<Response> {
    submit(state, Category::Image, Operation::Grayscale, multipart).await
}

pub async fn submit_image_filter(State(state): State<AppState>, multipart: Multipart) -> ApiResult<Response> {
    submit(state, Category::Image, Operation::Filter, multipart).await
}

pub async fn submit_video_grayscale(State(state): State<AppState>, multipart: Multipart) -> ApiResult<Response> {
    submit(state, Category::Video, Operation::Grayscale, multipart).await
}

pub async fn submit_video_filter(State(state): State<AppState>, multipart: Multipart) -> ApiResult<Response> {
    submit(state, Category::Video, Operation::Filter, multipart).await
}

async fn submit(state: AppState, category: Category, operation: Operation, multipart: Multipart) -> ApiResult<Response> {
    let form = SubmissionForm::read(category, multipart).await?;
    let compare = form.compare && category == Category::Image;

    let submission = state.admission.validate(
        category,
        operation,
        form.filter.as_deref(),
        form.factor.as_deref(),
        form.file_name,
        form.payload,
    )?;

    match state.admission.admit(&submission).await? {
        Admission::Queued(job_id) => {
            Ok((StatusCode::ACCEPTED, Json(QueuedResponse::new(category, job_id))).into_response())
        }
        Admission::Completed(done) => {
            let hw_time_ms = done.timing.map(|t| t.total_ms);
            let mut response = CompletedResponse {
                job_id: done.job_id,
                status: "finished",
                hw_image: BASE64.encode(&done.output),
                hw_time: done.timing.as_ref().map(Timing::display).unwrap_or_default(),
                hw_time_ms,
                sw_image: None,
                sw_time: None,
            };

            if compare {
                match render_reference(&submission).await {
                    Ok(reference) => {
                        response.sw_image = Some(BASE64.encode(&reference.jpeg));
                        response.sw_time = Some(Timing::single(reference.elapsed_ms).display());
                    }
                    Err(e) => warn!(job_id = %response.job_id, "Software reference failed: {}", e),
                }
            }

            Ok((StatusCode::OK, Json(response)).into_response())
        }
    }
}
