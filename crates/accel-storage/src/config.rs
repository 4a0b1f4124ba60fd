//! Store configuration.

use std::path::PathBuf;

/// Job store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root directory holding one sub-directory per job
    pub jobs_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            jobs_dir: PathBuf::from("./jobs"),
        }
    }
}

impl StoreConfig {
    pub fn new(jobs_dir: impl Into<PathBuf>) -> Self {
        Self {
            jobs_dir: jobs_dir.into(),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            jobs_dir: std::env::var("JOBS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./jobs")),
        }
    }
}
