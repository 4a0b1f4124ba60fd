//! Storage error types.

use thiserror::Error;

use accel_models::JobStage;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to allocate job storage: {0}")]
    AllocationFailed(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job {0} already reached a terminal stage")]
    AlreadyTerminal(String),

    #[error("Invalid stage transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: JobStage,
        to: JobStage,
    },

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Corrupt record {path}: {message}")]
    Corrupt { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StorageError {
    pub fn allocation_failed(msg: impl Into<String>) -> Self {
        Self::AllocationFailed(msg.into())
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn corrupt(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::NotFound(_) => true,
            StorageError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
