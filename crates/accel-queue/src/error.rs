//! Queue error types.

use thiserror::Error;

use accel_storage::StorageError;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Scan failed: {0}")]
    ScanFailed(String),

    #[error("Recovery failed for job {job_id}: {source}")]
    RecoveryFailed {
        job_id: String,
        #[source]
        source: StorageError,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl QueueError {
    pub fn scan_failed(msg: impl Into<String>) -> Self {
        Self::ScanFailed(msg.into())
    }
}
