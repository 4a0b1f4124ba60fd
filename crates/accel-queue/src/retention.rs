//! Bounded per-category history.

use tracing::{debug, info, warn};

use accel_models::{Category, HistoryEntry, JobStage, Operation, PARAM_FACTOR, PARAM_KERNEL, PARAM_OPERATION};

use crate::error::QueueResult;
use crate::queue::{JobQueue, QueueEntry};

/// Retention limits, counted over terminal jobs only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionConfig {
    pub image_limit: usize,
    pub video_limit: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            image_limit: 10,
            video_limit: 3,
        }
    }
}

impl RetentionConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            image_limit: std::env::var("RETENTION_IMAGE_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.image_limit),
            video_limit: std::env::var("RETENTION_VIDEO_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.video_limit),
        }
    }

    pub fn limit(&self, category: Category) -> usize {
        match category {
            Category::Image => self.image_limit,
            Category::Video => self.video_limit,
        }
    }
}

/// Purges old terminal jobs and lists history.
#[derive(Debug, Clone)]
pub struct RetentionManager {
    queue: JobQueue,
    config: RetentionConfig,
}

impl RetentionManager {
    pub fn new(queue: JobQueue, config: RetentionConfig) -> Self {
        Self { queue, config }
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    /// Purge the oldest terminal jobs of `category` beyond its limit.
    ///
    /// Best effort: a job that fails to delete is logged and skipped.
    /// Returns the number of jobs purged.
    pub async fn enforce(&self, category: Category) -> QueueResult<usize> {
        let limit = self.config.limit(category);
        let mut terminal = self.terminal_newest_first(Some(category)).await?;
        if terminal.len() <= limit {
            return Ok(0);
        }

        let excess = terminal.split_off(limit);
        Ok(self.purge(excess).await)
    }

    /// Delete every terminal job. Queued and in-flight jobs are untouched.
    pub async fn clear_terminal(&self) -> QueueResult<usize> {
        let terminal = self.terminal_newest_first(None).await?;
        let purged = self.purge(terminal).await;
        info!("Cleared {} terminal jobs", purged);
        Ok(purged)
    }

    /// Terminal jobs, newest first, at most `limit` entries.
    pub async fn history(&self, limit: usize) -> QueueResult<Vec<HistoryEntry>> {
        let terminal = self.terminal_newest_first(None).await?;
        let mut entries = Vec::with_capacity(terminal.len().min(limit));
        for entry in terminal.into_iter().take(limit) {
            entries.push(self.history_entry(entry).await);
        }
        Ok(entries)
    }

    async fn terminal_newest_first(&self, category: Option<Category>) -> QueueResult<Vec<QueueEntry>> {
        let mut terminal: Vec<QueueEntry> = self
            .queue
            .snapshot()
            .await?
            .into_iter()
            .filter(|e| e.is_terminal())
            .filter(|e| category.map_or(true, |c| e.meta.category == c))
            .collect();
        terminal.sort_by(|a, b| QueueEntry::fifo_order(b, a));
        Ok(terminal)
    }

    async fn purge(&self, entries: Vec<QueueEntry>) -> usize {
        let mut purged = 0;
        for entry in entries {
            match self.queue.store().delete(&entry.handle).await {
                Ok(()) => {
                    debug!(job_id = %entry.meta.id, category = %entry.meta.category, "Purged job");
                    purged += 1;
                }
                Err(e) => {
                    warn!(job_id = %entry.meta.id, "Failed to purge job: {}", e);
                }
            }
        }
        purged
    }

    async fn history_entry(&self, entry: QueueEntry) -> HistoryEntry {
        let store = self.queue.store();
        let meta = entry.meta;
        let id = meta.id.clone();

        let operation = meta.param(PARAM_OPERATION).and_then(|s| s.parse::<Operation>().ok());
        let factor = meta.param(PARAM_FACTOR).and_then(|s| s.parse().ok());
        let kernel = meta.param(PARAM_KERNEL).map(str::to_string);

        let timing = store.read_timing(&entry.handle).await;
        let thumbnail_url = store
            .has_thumbnail(&entry.handle)
            .await
            .then(|| HistoryEntry::thumbnail_path(&id));

        // a marker without a readable status still reports a terminal stage
        let stage = if entry.status.is_terminal() {
            entry.status.stage
        } else if meta.output.is_some() {
            JobStage::Finished
        } else {
            JobStage::Error
        };
        let download_url = (stage == JobStage::Finished && meta.output.is_some())
            .then(|| HistoryEntry::download_path(meta.category, &id));
        let progress_percent = if stage == JobStage::Finished {
            100
        } else {
            entry.status.percent()
        };
        let note = match entry.status.note {
            Some(note) => Some(note),
            None if stage == JobStage::Error => self.queue.status().error_message(&entry.handle).await,
            None => None,
        };

        HistoryEntry {
            job_id: id,
            category: meta.category,
            operation,
            kernel,
            factor,
            stage,
            note,
            created_at: meta.created_at,
            timing,
            progress_percent,
            thumbnail_url,
            download_url,
        }
    }
}
