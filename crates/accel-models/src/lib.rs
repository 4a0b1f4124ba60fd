//! Shared data models for the accelerator job queue.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, categories and operations
//! - Operation parameters (divisor factor, 3x3 kernel) and their validation
//! - Lifecycle stages and status records
//! - Timing records and history entries

pub mod error;
pub mod history;
pub mod job;
pub mod job_status;
pub mod params;
pub mod submission;
pub mod timing;

pub use error::{ModelError, ModelResult};
pub use history::HistoryEntry;
pub use job::{Category, Job, JobId, JobMetadata, Operation};
pub use job_status::{JobStage, JobStatus, Progress};
pub use params::{JobParams, Kernel, PARAM_FACTOR, PARAM_KERNEL, PARAM_OPERATION};
pub use submission::{Submission, SubmissionLimits};
pub use timing::Timing;
