//! API configuration.

use std::time::Duration;

use accel_models::SubmissionLimits;
use accel_queue::RetentionConfig;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Rate limit requests per second on submission routes
    pub rate_limit_rps: u32,
    /// Max request body size
    pub max_body_size: usize,
    /// Longest a submission waits for its own result before degrading to a
    /// queued acknowledgment
    pub quick_path_timeout: Duration,
    /// Status poll interval during the quick-path wait
    pub quick_path_poll: Duration,
    /// Payload size ceilings
    pub limits: SubmissionLimits,
    /// Most entries returned by the history listing
    pub history_limit: usize,
    pub retention: RetentionConfig,
    /// Environment (development/production)
    pub environment: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 10,
            max_body_size: 64 * 1024 * 1024, // 64MB
            quick_path_timeout: Duration::from_secs(10),
            quick_path_poll: Duration::from_millis(200),
            limits: SubmissionLimits::default(),
            history_limit: 50,
            retention: RetentionConfig::default(),
            environment: "development".to_string(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            rate_limit_rps: std::env::var("RATE_LIMIT_RPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.rate_limit_rps),
            max_body_size: std::env::var("MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_body_size),
            quick_path_timeout: Duration::from_secs(
                std::env::var("QUICK_PATH_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            quick_path_poll: Duration::from_millis(
                std::env::var("QUICK_PATH_POLL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|ms: &u64| *ms > 0)
                    .unwrap_or(200),
            ),
            limits: SubmissionLimits {
                max_image_bytes: std::env::var("MAX_IMAGE_BYTES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.limits.max_image_bytes),
                max_video_bytes: std::env::var("MAX_VIDEO_BYTES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.limits.max_video_bytes),
            },
            history_limit: std::env::var("HISTORY_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.history_limit),
            retention: RetentionConfig::from_env(),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}
