//! Job lifecycle stages and the status record published by the worker.
//!
//! The status record is the polling surface shared by the request tier and
//! the history listing. It is replaced atomically on every write, and a
//! missing or unreadable record is read back as [`JobStatus::unknown`].

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Lifecycle stage of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    /// Waiting for the worker
    #[default]
    Queued,
    /// Worker picked the job and is reading its payload
    Receiving,
    /// Accelerator profile for the operation is active
    KernelLoaded,
    /// Frames are being accelerated
    Processing,
    /// Video only: finalising the output stream
    Merging,
    /// Output is available
    Finished,
    /// Job failed; the note carries the reason
    Error,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Queued => "queued",
            JobStage::Receiving => "receiving",
            JobStage::KernelLoaded => "kernel_loaded",
            JobStage::Processing => "processing",
            JobStage::Merging => "merging",
            JobStage::Finished => "finished",
            JobStage::Error => "error",
        }
    }

    fn ordinal(&self) -> u8 {
        match self {
            JobStage::Queued => 0,
            JobStage::Receiving => 1,
            JobStage::KernelLoaded => 2,
            JobStage::Processing => 3,
            JobStage::Merging => 4,
            JobStage::Finished => 5,
            JobStage::Error => 6,
        }
    }

    /// Check if this is a terminal stage (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStage::Finished | JobStage::Error)
    }

    /// Stages during which the job holds the accelerator.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            JobStage::Receiving | JobStage::KernelLoaded | JobStage::Processing | JobStage::Merging
        )
    }

    /// Stages that a crashed worker must not resume from.
    pub fn needs_recovery(&self) -> bool {
        matches!(
            self,
            JobStage::KernelLoaded | JobStage::Processing | JobStage::Merging
        )
    }

    /// Whether a status write may move from `self` to `next`.
    ///
    /// Stages only move forward; staying on the same stage is allowed so
    /// progress can be republished. `Error` is reachable from any
    /// non-terminal stage. Terminal stages accept nothing.
    pub fn can_advance_to(&self, next: JobStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == JobStage::Error || next.ordinal() >= self.ordinal()
    }
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Progress pair (done, total).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Progress {
    pub done: u64,
    pub total: u64,
}

impl Progress {
    pub fn new(done: u64, total: u64) -> Self {
        Self { done, total }
    }

    /// Completion percentage clamped to 0..=100.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.done.min(self.total) * 100) / self.total) as u8
    }
}

/// Status record for a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobStatus {
    pub stage: JobStage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    pub updated_at: DateTime<Utc>,
}

impl JobStatus {
    /// Create a status record stamped now.
    pub fn new(stage: JobStage) -> Self {
        Self {
            stage,
            note: None,
            progress: None,
            updated_at: Utc::now(),
        }
    }

    /// Fail-soft default for a missing or corrupt record.
    pub fn unknown() -> Self {
        Self {
            stage: JobStage::Queued,
            note: None,
            progress: None,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Check if the job is in a terminal stage.
    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Percentage shown to callers: finished jobs are complete, others
    /// report their last published progress.
    pub fn percent(&self) -> u8 {
        match self.stage {
            JobStage::Finished => 100,
            _ => self.progress.map(|p| p.percent()).unwrap_or(0),
        }
    }
}
