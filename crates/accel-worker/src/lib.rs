//! Accelerator worker.
//!
//! This crate provides:
//! - The single-consumer job executor with startup recovery
//! - Image and video handlers dispatched by (category, operation)
//! - Accelerator profile caching
//! - Structured job logging and metrics

pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod logging;
pub mod metrics;

pub use config::WorkerConfig;
pub use engine::{Engine, ProfileCache};
pub use error::{WorkerError, WorkerResult};
pub use executor::{JobExecutor, JobOutcome};
pub use handlers::{HandlerOutput, HandlerRegistry, ImageHandler, JobContext, JobHandler, VideoHandler};
pub use logging::JobLogger;
