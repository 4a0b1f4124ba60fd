//! FIFO view over the job store.
//!
//! There is no separate queue structure: the job store is the mailbox. Each
//! scan lists committed jobs, reads their record and status, and orders them
//! by creation time. A job is pending while it has no terminal marker and
//! its status stage is not terminal.

use std::cmp::Ordering;
use std::collections::HashSet;

use tracing::{debug, error, info, warn};

use accel_models::{JobId, JobMetadata, JobStatus};
use accel_storage::{JobHandle, JobStore, StatusPublisher};

use crate::error::{QueueError, QueueResult};

/// One job as seen by a scan.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub handle: JobHandle,
    pub meta: JobMetadata,
    pub status: JobStatus,
    /// Whether a terminal marker exists
    pub marked: bool,
}

impl QueueEntry {
    pub fn is_pending(&self) -> bool {
        !self.marked && !self.status.is_terminal()
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_pending()
    }

    /// Oldest first, ties broken by id so the order is total.
    pub fn fifo_order(a: &QueueEntry, b: &QueueEntry) -> Ordering {
        a.meta
            .created_at
            .cmp(&b.meta.created_at)
            .then_with(|| a.meta.id.cmp(&b.meta.id))
    }
}

/// Result of startup recovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Jobs put back to `queued`
    pub reset: Vec<JobId>,
    /// Jobs whose terminal marker was rewritten
    pub repaired: Vec<JobId>,
    /// Jobs that could not be reset or repaired; left as they were
    pub failed: Vec<JobId>,
}

/// Scheduling queries over the job store.
#[derive(Debug, Clone)]
pub struct JobQueue {
    store: JobStore,
    status: StatusPublisher,
}

impl JobQueue {
    pub fn new(store: JobStore) -> Self {
        Self {
            store,
            status: StatusPublisher::new(),
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn status(&self) -> &StatusPublisher {
        &self.status
    }

    /// Read one job. `None` if it vanished or its record is unreadable.
    pub async fn entry(&self, handle: &JobHandle) -> Option<QueueEntry> {
        let meta = match self.store.read_metadata(handle).await {
            Ok(meta) => meta,
            Err(e) if e.is_not_found() => {
                debug!(job_id = %handle.id(), "Job disappeared during scan");
                return None;
            }
            Err(e) => {
                warn!(job_id = %handle.id(), "Skipping unreadable job: {}", e);
                return None;
            }
        };
        let marked = self.status.is_terminal(handle).await;
        let status = self.status.read_status(handle).await;

        Some(QueueEntry {
            handle: handle.clone(),
            meta,
            status,
            marked,
        })
    }

    /// Read every committed job, unordered.
    pub async fn snapshot(&self) -> QueueResult<Vec<QueueEntry>> {
        let mut jobs = self
            .store
            .list_all()
            .await
            .map_err(|e| QueueError::scan_failed(e.to_string()))?;

        let mut entries = Vec::new();
        while let Some(handle) = jobs.next().await? {
            if let Some(entry) = self.entry(&handle).await {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Oldest pending job, if any.
    pub async fn next_pending(&self) -> QueueResult<Option<QueueEntry>> {
        self.next_pending_excluding(&HashSet::new()).await
    }

    /// Oldest pending job whose id is not in `skip`.
    pub async fn next_pending_excluding(&self, skip: &HashSet<JobId>) -> QueueResult<Option<QueueEntry>> {
        let entries = self.snapshot().await?;
        Ok(entries
            .into_iter()
            .filter(|entry| entry.is_pending() && !skip.contains(&entry.meta.id))
            .min_by(QueueEntry::fifo_order))
    }

    /// Whether any job other than `except` is pending.
    pub async fn has_pending(&self, except: Option<&JobId>) -> QueueResult<bool> {
        let mut jobs = self
            .store
            .list_all()
            .await
            .map_err(|e| QueueError::scan_failed(e.to_string()))?;

        while let Some(handle) = jobs.next().await? {
            if Some(handle.id()) == except {
                continue;
            }
            if let Some(entry) = self.entry(&handle).await {
                if entry.is_pending() {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Put jobs interrupted mid-flight back in the queue and restore terminal
    /// markers lost between the status write and the marker write.
    ///
    /// A job that cannot be fixed is logged, listed in
    /// [`RecoveryReport::failed`] and skipped.
    pub async fn recover_interrupted(&self) -> QueueResult<RecoveryReport> {
        let mut report = RecoveryReport::default();

        for entry in self.snapshot().await? {
            if entry.marked {
                continue;
            }
            let id = entry.meta.id.clone();

            let result = if entry.status.is_terminal() {
                self.status.write_missing_marker(&entry.handle).await.map(|written| {
                    if written {
                        warn!(job_id = %id, stage = %entry.status.stage, "Restored missing terminal marker");
                        report.repaired.push(id.clone());
                    }
                })
            } else if entry.status.stage.needs_recovery() {
                let note = format!("requeued after interruption at {}", entry.status.stage);
                self.status.reset_to_queued(&entry.handle, &note).await.map(|()| {
                    warn!(job_id = %id, stage = %entry.status.stage, "Reset interrupted job to queued");
                    report.reset.push(id.clone());
                })
            } else {
                Ok(())
            };

            if let Err(source) = result {
                let err = QueueError::RecoveryFailed {
                    job_id: id.to_string(),
                    source,
                };
                error!("{}", err);
                report.failed.push(id);
            }
        }

        if !report.reset.is_empty() || !report.repaired.is_empty() || !report.failed.is_empty() {
            info!(
                "Recovery complete: {} reset, {} repaired, {} failed",
                report.reset.len(),
                report.repaired.len(),
                report.failed.len()
            );
        }
        Ok(report)
    }
}
