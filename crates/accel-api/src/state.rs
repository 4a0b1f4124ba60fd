//! Application state.

use std::sync::Arc;

use accel_queue::{JobQueue, RetentionManager};
use accel_storage::JobStore;

use crate::config::ApiConfig;
use crate::services::AdmissionController;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub queue: JobQueue,
    pub retention: Arc<RetentionManager>,
    pub admission: Arc<AdmissionController>,
}

impl AppState {
    pub fn new(config: ApiConfig, store: JobStore) -> Self {
        let queue = JobQueue::new(store);
        let retention = RetentionManager::new(queue.clone(), config.retention);
        let admission = AdmissionController::new(queue.clone(), &config);

        Self {
            config,
            queue,
            retention: Arc::new(retention),
            admission: Arc::new(admission),
        }
    }

    pub fn store(&self) -> &JobStore {
        self.queue.store()
    }
}
