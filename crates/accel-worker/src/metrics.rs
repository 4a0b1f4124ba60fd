//! Worker metrics.
//!
//! Recorded into the global `metrics` recorder, which is a no-op until
//! [`init_metrics`] installs the Prometheus exporter.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use accel_models::{Category, Operation};

use crate::error::{WorkerError, WorkerResult};

/// Serve Prometheus metrics on `0.0.0.0:port`.
pub fn init_metrics(port: u16) -> WorkerResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("Failed to install Prometheus exporter: {}", e)))
}

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_COMPLETED_TOTAL: &str = "accel_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "accel_jobs_failed_total";
    pub const JOB_DURATION_SECONDS: &str = "accel_job_duration_seconds";
    pub const FRAMES_ACCELERATED_TOTAL: &str = "accel_frames_accelerated_total";
    pub const ACCELERATOR_MILLISECONDS: &str = "accel_accelerator_milliseconds";
    pub const PROFILE_LOADS_TOTAL: &str = "accel_profile_loads_total";
    pub const RETENTION_PURGED_TOTAL: &str = "accel_retention_purged_total";
    pub const JOBS_RECOVERED_TOTAL: &str = "accel_jobs_recovered_total";
}

fn job_labels(category: Category, operation: Operation) -> [(&'static str, String); 2] {
    [
        ("category", category.to_string()),
        ("operation", operation.to_string()),
    ]
}

pub fn record_job_completed(category: Category, operation: Operation, duration_secs: f64) {
    let labels = job_labels(category, operation);
    counter!(names::JOBS_COMPLETED_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_job_failed(category: Category, reason: &str) {
    let labels = [
        ("category", category.to_string()),
        ("reason", reason.to_string()),
    ];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

/// Record one accelerator invocation.
pub fn record_frame_accelerated(operation: Operation, elapsed_ms: f64) {
    let labels = [("operation", operation.to_string())];
    counter!(names::FRAMES_ACCELERATED_TOTAL, &labels).increment(1);
    histogram!(names::ACCELERATOR_MILLISECONDS, &labels).record(elapsed_ms);
}

pub fn record_profile_load(operation: Operation) {
    let labels = [("operation", operation.to_string())];
    counter!(names::PROFILE_LOADS_TOTAL, &labels).increment(1);
}

pub fn record_retention_purged(category: Category, purged: usize) {
    if purged == 0 {
        return;
    }
    let labels = [("category", category.to_string())];
    counter!(names::RETENTION_PURGED_TOTAL, &labels).increment(purged as u64);
}

pub fn record_jobs_recovered(reset: usize, repaired: usize) {
    counter!(names::JOBS_RECOVERED_TOTAL, "kind" => "reset").increment(reset as u64);
    counter!(names::JOBS_RECOVERED_TOTAL, "kind" => "repaired").increment(repaired as u64);
}
