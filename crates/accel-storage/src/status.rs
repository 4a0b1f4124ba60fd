//! Status publisher.
//!
//! Writes the status record for a job and the terminal markers that make
//! completion visible. Terminal status is always written before its marker,
//! so a reader that sees a marker also sees the final status. A crash between
//! the two leaves a terminal status without a marker, which recovery repairs.

use tokio::fs;
use tracing::{debug, warn};

use accel_models::{JobStage, JobStatus, Progress};

use crate::error::{StorageError, StorageResult};
use crate::fs_utils::atomic_write;
use crate::layout;
use crate::store::JobHandle;

/// Publishes job status records.
#[derive(Debug, Clone, Default)]
pub struct StatusPublisher;

impl StatusPublisher {
    pub fn new() -> Self {
        Self
    }

    /// Replace the status record of a job.
    ///
    /// Refused once the job carries a terminal marker, or when the move would
    /// go backwards.
    pub async fn write_status(
        &self,
        job: &JobHandle,
        stage: JobStage,
        note: Option<&str>,
        progress: Option<Progress>,
    ) -> StorageResult<JobStatus> {
        if self.is_terminal(job).await {
            return Err(StorageError::AlreadyTerminal(job.id().to_string()));
        }

        let current = self.read_status(job).await;
        if !current.stage.can_advance_to(stage) {
            return Err(StorageError::InvalidTransition {
                job_id: job.id().to_string(),
                from: current.stage,
                to: stage,
            });
        }

        let mut status = JobStatus::new(stage);
        status.note = note.map(str::to_string);
        status.progress = progress;

        self.put(job, &status).await?;
        debug!(job_id = %job.id(), stage = %stage, "Published status");
        Ok(status)
    }

    /// Read the status record. Never fails: a missing or corrupt record reads
    /// as [`JobStatus::unknown`].
    pub async fn read_status(&self, job: &JobHandle) -> JobStatus {
        let path = job.path(layout::STATUS_RECORD);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return JobStatus::unknown(),
            Err(e) => {
                warn!(job_id = %job.id(), "Failed to read status record: {}", e);
                return JobStatus::unknown();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(status) => status,
            Err(e) => {
                warn!(job_id = %job.id(), "Corrupt status record: {}", e);
                JobStatus::unknown()
            }
        }
    }

    /// Publish `finished` and then the done marker.
    pub async fn mark_finished(
        &self,
        job: &JobHandle,
        note: Option<&str>,
        progress: Option<Progress>,
    ) -> StorageResult<JobStatus> {
        let status = self.write_status(job, JobStage::Finished, note, progress).await?;
        atomic_write(job.path(layout::DONE_MARKER), b"").await?;
        Ok(status)
    }

    /// Publish `error` with `message` and then the error marker holding it.
    pub async fn mark_failed(&self, job: &JobHandle, message: &str) -> StorageResult<JobStatus> {
        let status = self.write_status(job, JobStage::Error, Some(message), None).await?;
        atomic_write(job.path(layout::ERROR_MARKER), message).await?;
        Ok(status)
    }

    /// Whether the job carries a terminal marker.
    pub async fn is_terminal(&self, job: &JobHandle) -> bool {
        marker_exists(job, layout::DONE_MARKER).await || marker_exists(job, layout::ERROR_MARKER).await
    }

    /// Failure message left by [`StatusPublisher::mark_failed`].
    pub async fn error_message(&self, job: &JobHandle) -> Option<String> {
        fs::read_to_string(job.path(layout::ERROR_MARKER)).await.ok()
    }

    /// Put an interrupted job back in the queue.
    ///
    /// Bypasses the forward-only rule; only startup recovery calls this.
    pub async fn reset_to_queued(&self, job: &JobHandle, note: &str) -> StorageResult<()> {
        if self.is_terminal(job).await {
            return Err(StorageError::AlreadyTerminal(job.id().to_string()));
        }
        self.put(job, &JobStatus::new(JobStage::Queued).with_note(note)).await
    }

    /// Write the marker matching a terminal status that lost its marker.
    ///
    /// Returns whether a marker was written.
    pub async fn write_missing_marker(&self, job: &JobHandle) -> StorageResult<bool> {
        if self.is_terminal(job).await {
            return Ok(false);
        }
        let status = self.read_status(job).await;
        match status.stage {
            JobStage::Finished => {
                atomic_write(job.path(layout::DONE_MARKER), b"").await?;
                Ok(true)
            }
            JobStage::Error => {
                let message = status.note.unwrap_or_default();
                atomic_write(job.path(layout::ERROR_MARKER), message).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn put(&self, job: &JobHandle, status: &JobStatus) -> StorageResult<()> {
        atomic_write(job.path(layout::STATUS_RECORD), serde_json::to_vec(status)?).await
    }
}

async fn marker_exists(job: &JobHandle, marker: &str) -> bool {
    fs::try_exists(job.path(marker)).await.unwrap_or(false)
}
