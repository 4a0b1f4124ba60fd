//! Per-(category, operation) job handlers.
//!
//! The executor owns the lifecycle up to `receiving` and from the terminal
//! marker on. A handler drives everything in between: profile activation,
//! decode, acceleration, encode and output persistence.

mod image;
mod video;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use accel_media::VideoCodec;
use accel_models::{Category, Job, JobStage, Operation, Progress, Timing};
use accel_storage::{JobHandle, JobStore, StatusPublisher};

use crate::config::WorkerConfig;
use crate::engine::Engine;
use crate::error::WorkerResult;
use crate::logging::JobLogger;

pub use self::image::ImageHandler;
pub use self::video::VideoHandler;

/// Everything a handler may touch while running one job.
pub struct JobContext<'a> {
    pub job: &'a Job,
    pub handle: &'a JobHandle,
    pub store: &'a JobStore,
    pub status: &'a StatusPublisher,
    pub config: &'a WorkerConfig,
    pub logger: &'a JobLogger,
}

impl JobContext<'_> {
    /// Publish an intermediate stage for this job.
    pub async fn publish(&self, stage: JobStage, progress: Option<Progress>) -> WorkerResult<()> {
        self.status.write_status(self.handle, stage, None, progress).await?;
        Ok(())
    }
}

/// What a successful handler leaves for the executor to persist.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandlerOutput {
    pub timing: Timing,
    pub progress: Progress,
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Process the job up to, but not including, its terminal stage.
    async fn handle(&self, ctx: &JobContext<'_>, engine: &mut Engine) -> WorkerResult<HandlerOutput>;
}

/// Dispatch table keyed by (category, operation).
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<(Category, Operation), Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The four built-in handlers.
    pub fn standard(codec: Arc<dyn VideoCodec>) -> Self {
        let image: Arc<dyn JobHandler> = Arc::new(ImageHandler);
        let video: Arc<dyn JobHandler> = Arc::new(VideoHandler::new(codec));

        let mut registry = Self::empty();
        for operation in Operation::ALL {
            registry = registry
                .register(Category::Image, operation, image.clone())
                .register(Category::Video, operation, video.clone());
        }
        registry
    }

    pub fn register(mut self, category: Category, operation: Operation, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.insert((category, operation), handler);
        self
    }

    pub fn get(&self, category: Category, operation: Operation) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&(category, operation)).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<String> = self
            .handlers
            .iter()
            .map(|((category, operation), handler)| format!("{}/{}={}", category, operation, handler.name()))
            .collect();
        keys.sort();
        f.debug_struct("HandlerRegistry").field("handlers", &keys).finish()
    }
}
