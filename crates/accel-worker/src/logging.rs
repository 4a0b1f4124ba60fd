//! Structured job logging.
//!
//! Every lifecycle line of a job carries the same `job_id` and `operation`
//! fields so a single job can be followed through the worker output.

use tracing::{error, info, warn, Span};

use accel_models::{Category, JobId, Operation};

/// Job logger with consistent structured fields.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: String,
}

impl JobLogger {
    /// Logger for a typed job; the operation field reads `category/operation`.
    pub fn new(job_id: &JobId, category: Category, operation: Operation) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation: format!("{}/{}", category, operation),
        }
    }

    /// Logger for a job whose operation could not be resolved.
    pub fn from_string(job_id: &str, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span covering one job from dequeue to terminal marker.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            operation = %self.operation
        )
    }
}
