//! Worker configuration.

use std::time::Duration;

use accel_queue::RetentionConfig;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Sleep between scans when no job is pending
    pub poll_interval: Duration,
    /// Publish video progress every N frames (and on the last)
    pub progress_every: u64,
    /// Largest video frame handed to the accelerator
    pub video_max_width: u32,
    pub video_max_height: u32,
    /// x264 preset for re-encoding
    pub video_preset: String,
    /// Port for the Prometheus listener; metrics stay in-process when unset
    pub metrics_port: Option<u16>,
    pub retention: RetentionConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            progress_every: 5,
            video_max_width: 1280,
            video_max_height: 720,
            video_preset: "veryfast".to_string(),
            metrics_port: None,
            retention: RetentionConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: Duration::from_millis(
                std::env::var("WORKER_POLL_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(500),
            ),
            progress_every: std::env::var("WORKER_PROGRESS_EVERY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &u64| *n > 0)
                .unwrap_or(defaults.progress_every),
            video_max_width: std::env::var("VIDEO_MAX_WIDTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.video_max_width),
            video_max_height: std::env::var("VIDEO_MAX_HEIGHT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.video_max_height),
            video_preset: std::env::var("VIDEO_PRESET").unwrap_or(defaults.video_preset),
            metrics_port: std::env::var("WORKER_METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok()),
            retention: RetentionConfig::from_env(),
        }
    }
}
