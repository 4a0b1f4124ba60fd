//! Exclusive accelerator ownership.
//!
//! The engine is the only holder of the accelerator. It remembers which
//! profile is active so consecutive jobs of the same operation skip the
//! expensive reload.

use tracing::{info, warn};

use accel_media::{AccelConfig, Accelerated, Accelerator, Frame, MediaResult};
use accel_models::Operation;

use crate::metrics;

/// Tracks the profile currently loaded on the accelerator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileCache {
    active: Option<Operation>,
    loads: u64,
}

impl ProfileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<Operation> {
        self.active
    }

    /// Number of profile loads performed so far.
    pub fn loads(&self) -> u64 {
        self.loads
    }

    pub fn needs_load(&self, operation: Operation) -> bool {
        self.active != Some(operation)
    }

    fn record_loaded(&mut self, operation: Operation) {
        self.active = Some(operation);
        self.loads += 1;
    }

    /// Forget the active profile; the next job reloads unconditionally.
    fn invalidate(&mut self) {
        self.active = None;
    }
}

/// The accelerator together with its profile cache.
pub struct Engine {
    accelerator: Box<dyn Accelerator>,
    profiles: ProfileCache,
}

impl Engine {
    pub fn new(accelerator: Box<dyn Accelerator>) -> Self {
        Self {
            accelerator,
            profiles: ProfileCache::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.accelerator.name()
    }

    pub fn profiles(&self) -> &ProfileCache {
        &self.profiles
    }

    /// Make `operation` the active profile.
    ///
    /// Returns `true` when a load actually happened.
    pub async fn ensure_profile(&mut self, operation: Operation) -> MediaResult<bool> {
        if !self.profiles.needs_load(operation) {
            return Ok(false);
        }

        match self.accelerator.load_profile(operation).await {
            Ok(()) => {
                self.profiles.record_loaded(operation);
                metrics::record_profile_load(operation);
                info!(accelerator = self.name(), operation = %operation, "Loaded accelerator profile");
                Ok(true)
            }
            Err(e) => {
                self.profiles.invalidate();
                warn!(accelerator = self.name(), operation = %operation, "Profile load failed: {}", e);
                Err(e)
            }
        }
    }

    /// Run one frame through the accelerator.
    pub async fn accelerate(&mut self, frame: &Frame, config: &AccelConfig) -> MediaResult<Accelerated> {
        let out = self.accelerator.accelerate(frame, config).await?;
        metrics::record_frame_accelerated(config.operation, out.elapsed_ms);
        Ok(out)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("accelerator", &self.accelerator.name())
            .field("profiles", &self.profiles)
            .finish()
    }
}
