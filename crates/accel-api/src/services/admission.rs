//! Admission controller.
//!
//! Turns a validated submission into a committed job and decides whether
//! the caller waits for it. The caller only waits when the job is an image
//! and nothing else is pending; every other case gets a queued
//! acknowledgment straight away so nobody blocks behind someone else's
//! work. The wait itself is bounded, after which the caller degrades to the
//! same acknowledgment.

use std::time::Duration;

use tracing::{debug, info, warn};

use accel_models::{
    Category, JobId, JobStage, Operation, Submission, SubmissionLimits, Timing, PARAM_FACTOR, PARAM_KERNEL,
    PARAM_OPERATION,
};
use accel_queue::JobQueue;
use accel_storage::JobHandle;

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::metrics;

/// Output of a job that finished inside the quick-path window.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedJob {
    pub job_id: JobId,
    pub output: Vec<u8>,
    pub timing: Option<Timing>,
}

/// How a submission was admitted.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Completed(CompletedJob),
    Queued(JobId),
}

/// Why a submission took the queued path. Used as a metrics label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuedReason {
    /// Videos never wait
    Video,
    /// Another job was already pending
    Busy,
    /// The job did not finish inside the quick-path window
    Timeout,
}

impl QueuedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueuedReason::Video => "video",
            QueuedReason::Busy => "busy",
            QueuedReason::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdmissionController {
    queue: JobQueue,
    limits: SubmissionLimits,
    quick_path_timeout: Duration,
    quick_path_poll: Duration,
}

impl AdmissionController {
    pub fn new(queue: JobQueue, config: &ApiConfig) -> Self {
        Self {
            queue,
            limits: config.limits,
            quick_path_timeout: config.quick_path_timeout,
            quick_path_poll: config.quick_path_poll,
        }
    }

    /// Validate raw form fields. Nothing is written on failure.
    pub fn validate(
        &self,
        category: Category,
        operation: Operation,
        filter: Option<&str>,
        factor: Option<&str>,
        file_name: Option<String>,
        payload: Vec<u8>,
    ) -> ApiResult<Submission> {
        Submission::from_form(category, operation, filter, factor, file_name, payload, &self.limits).map_err(|e| {
            debug!(category = %category, operation = %operation, "Rejected submission: {}", e);
            metrics::record_rejection(category, if e.is_rejection() { "limit" } else { "invalid" });
            ApiError::from(e)
        })
    }

    /// Write the job and make it visible to the worker in one step.
    pub async fn create_job(&self, submission: &Submission) -> ApiResult<JobHandle> {
        let store = self.queue.store();
        let staged = store.create(submission.category).await?;

        if let Err(e) = self.fill(&staged, submission).await {
            store.discard(staged).await;
            return Err(e);
        }

        match store.commit(staged.clone()).await {
            Ok(handle) => {
                info!(
                    job_id = %handle.id(),
                    category = %submission.category,
                    operation = %submission.operation,
                    "Job submitted"
                );
                Ok(handle)
            }
            Err(e) => {
                store.discard(staged).await;
                Err(e.into())
            }
        }
    }

    async fn fill(&self, staged: &JobHandle, submission: &Submission) -> ApiResult<()> {
        let store = self.queue.store();
        store
            .store_input(staged, &submission.input_file_name(), &submission.payload)
            .await?;
        store
            .set_parameter(staged, PARAM_OPERATION, submission.operation.as_str())
            .await?;
        if let Some(kernel) = submission.params.kernel {
            store.set_parameter(staged, PARAM_KERNEL, &kernel.to_param_string()).await?;
            store
                .set_parameter(staged, PARAM_FACTOR, &submission.params.factor.to_string())
                .await?;
        }
        self.queue
            .status()
            .write_status(staged, JobStage::Queued, None, None)
            .await?;
        Ok(())
    }

    /// Create the job and wait for it when the quick path applies.
    pub async fn admit(&self, submission: &Submission) -> ApiResult<Admission> {
        let handle = self.create_job(submission).await?;
        let job_id = handle.id().clone();
        let category = submission.category;

        if category == Category::Video {
            return Ok(self.queued(category, job_id, QueuedReason::Video));
        }
        if self.queue.has_pending(Some(&job_id)).await? {
            return Ok(self.queued(category, job_id, QueuedReason::Busy));
        }
        if !self.wait_for_terminal(&handle).await {
            return Ok(self.queued(category, job_id, QueuedReason::Timeout));
        }

        let completed = self.collect(&handle).await;
        metrics::record_submission(category, if completed.is_ok() { "sync" } else { "sync_error" });
        completed.map(Admission::Completed)
    }

    fn queued(&self, category: Category, job_id: JobId, reason: QueuedReason) -> Admission {
        debug!(job_id = %job_id, reason = reason.as_str(), "Submission queued");
        metrics::record_submission(category, reason.as_str());
        Admission::Queued(job_id)
    }

    /// Poll until the job carries a terminal marker or the window closes.
    async fn wait_for_terminal(&self, handle: &JobHandle) -> bool {
        let status = self.queue.status();
        let poll = self.quick_path_poll;
        tokio::time::timeout(self.quick_path_timeout, async {
            while !status.is_terminal(handle).await {
                tokio::time::sleep(poll).await;
            }
        })
        .await
        .is_ok()
    }

    /// Read back a terminal job.
    async fn collect(&self, handle: &JobHandle) -> ApiResult<CompletedJob> {
        let status = self.queue.status();
        let record = status.read_status(handle).await;
        let job_id = handle.id().clone();

        if record.stage == JobStage::Error || status.error_message(handle).await.is_some() {
            let message = match status.error_message(handle).await {
                Some(message) if !message.is_empty() => message,
                _ => record.note.unwrap_or_else(|| "job failed".to_string()),
            };
            return Err(ApiError::ProcessingFailed { job_id, message });
        }

        let store = self.queue.store();
        let Some((_, output)) = store.read_output(handle).await? else {
            warn!(job_id = %job_id, "Finished job has no output");
            return Err(ApiError::internal(format!("job {} finished without output", job_id)));
        };
        let timing = store.read_timing(handle).await;

        Ok(CompletedJob { job_id, output, timing })
    }
}
