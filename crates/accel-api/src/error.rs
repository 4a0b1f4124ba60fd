//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use accel_models::{JobId, ModelError};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// The job reached `error`; carries the note it was marked with.
    #[error("Processing failed: {message}")]
    ProcessingFailed { job_id: JobId, message: String },

    #[error("Rate limited")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(#[from] accel_storage::StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] accel_queue::QueueError),

    #[error("Media error: {0}")]
    Media(#[from] accel_media::MediaError),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::ProcessingFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) | ApiError::Storage(_) | ApiError::Queue(_) | ApiError::Media(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn is_internal(&self) -> bool {
        self.status_code() == StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl From<ModelError> for ApiError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::Validation(msg) => ApiError::Validation(msg),
            ModelError::ResourceLimit(msg) => ApiError::PayloadTooLarge(msg),
            ModelError::InvalidJobId(_) => ApiError::NotFound(e.to_string()),
            other => ApiError::Validation(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_id: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = if self.is_internal() && std::env::var("ENVIRONMENT").unwrap_or_default() == "production" {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let job_id = match &self {
            ApiError::ProcessingFailed { job_id, .. } => Some(job_id.to_string()),
            _ => None,
        };

        (status, Json(ErrorResponse { detail, job_id })).into_response()
    }
}
