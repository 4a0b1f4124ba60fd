//! Single-consumer job queue over the filesystem job store.
//!
//! This crate provides:
//! - Strict FIFO selection of the next pending job
//! - Pending checks used by admission control
//! - Startup recovery of jobs interrupted mid-flight
//! - Per-category retention and the history listing

pub mod error;
pub mod queue;
pub mod retention;

pub use error::{QueueError, QueueResult};
pub use queue::{JobQueue, QueueEntry, RecoveryReport};
pub use retention::{RetentionConfig, RetentionManager};
