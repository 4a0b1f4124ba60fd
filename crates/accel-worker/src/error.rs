//! Worker error types.

use thiserror::Error;

use accel_models::{Category, ModelError, Operation};

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Unsupported job: no handler for {category}/{operation}")]
    Unsupported { category: Category, operation: Operation },

    #[error("Invalid job: {0}")]
    InvalidJob(#[from] ModelError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    Storage(#[from] accel_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] accel_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] accel_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn processing_failed(msg: impl Into<String>) -> Self {
        Self::ProcessingFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Whether the failure came from decoding, accelerating or encoding the
    /// payload rather than from the job store.
    pub fn is_processing_failure(&self) -> bool {
        matches!(
            self,
            WorkerError::ProcessingFailed(_) | WorkerError::Media(_) | WorkerError::JobFailed(_)
        )
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerError::JobFailed(_) | WorkerError::ProcessingFailed(_) | WorkerError::Media(_) => "processing",
            WorkerError::Unsupported { .. } => "unsupported",
            WorkerError::InvalidJob(_) => "invalid",
            WorkerError::ConfigError(_) => "config",
            WorkerError::Storage(_) | WorkerError::Queue(_) | WorkerError::Io(_) => "storage",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accel_media::MediaError;

    #[test]
    fn test_processing_classification() {
        assert!(WorkerError::from(MediaError::invalid_frame("bad")).is_processing_failure());
        assert!(WorkerError::processing_failed("no frames").is_processing_failure());

        let unsupported = WorkerError::Unsupported {
            category: Category::Video,
            operation: Operation::Filter,
        };
        assert!(!unsupported.is_processing_failure());
        assert_eq!(unsupported.kind(), "unsupported");
        assert_eq!(
            unsupported.to_string(),
            "Unsupported job: no handler for video/filter"
        );
    }
}
