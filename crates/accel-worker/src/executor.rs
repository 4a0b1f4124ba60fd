//! Job executor.
//!
//! A single loop owns the accelerator. Each iteration takes the oldest
//! pending job, drives it to a terminal marker and only then looks at the
//! next one, so at most one job is ever in flight. A failing job is recorded
//! on the job itself and never stops the loop. A job whose failure cannot be
//! recorded is skipped for the rest of the process lifetime.

use std::collections::HashSet;
use std::time::Instant;

use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn, Instrument};

use accel_media::Accelerator;
use accel_models::{Category, Job, JobId, JobStage};
use accel_queue::{JobQueue, QueueEntry, RecoveryReport, RetentionManager};
use accel_storage::{JobHandle, JobStore};

use crate::config::WorkerConfig;
use crate::engine::Engine;
use crate::error::{WorkerError, WorkerResult};
use crate::handlers::{HandlerOutput, HandlerRegistry, JobContext};
use crate::logging::JobLogger;
use crate::metrics;

/// How a dequeued job ended.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Finished(HandlerOutput),
    Failed(String),
}

/// Job executor that drains the job store in FIFO order.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: JobQueue,
    retention: RetentionManager,
    handlers: HandlerRegistry,
    engine: Mutex<Engine>,
    /// Jobs left pending because marking them failed did not succeed
    unrecorded: Mutex<HashSet<JobId>>,
    shutdown: watch::Sender<bool>,
}

impl JobExecutor {
    pub fn new(
        config: WorkerConfig,
        store: JobStore,
        accelerator: Box<dyn Accelerator>,
        handlers: HandlerRegistry,
    ) -> Self {
        let queue = JobQueue::new(store);
        let retention = RetentionManager::new(queue.clone(), config.retention);
        let (shutdown, _) = watch::channel(false);

        Self {
            config,
            queue,
            retention,
            handlers,
            engine: Mutex::new(Engine::new(accelerator)),
            unrecorded: Mutex::new(HashSet::new()),
            shutdown,
        }
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Profile loads performed so far.
    pub async fn profile_loads(&self) -> u64 {
        self.engine.lock().await.profiles().loads()
    }

    /// Reset jobs interrupted by a previous crash.
    pub async fn recover(&self) -> WorkerResult<RecoveryReport> {
        let report = self.queue.recover_interrupted().await?;
        metrics::record_jobs_recovered(report.reset.len(), report.repaired.len());
        Ok(report)
    }

    /// Start the executor. Returns after [`JobExecutor::shutdown`].
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor over {} with {} handlers",
            self.queue.store().root().display(),
            self.handlers.len()
        );

        self.queue.store().init().await?;
        self.recover().await?;

        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            match self.run_once().await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => error!("Queue scan failed: {}", e),
            }

            tokio::select! {
                _ = shutdown_rx.changed() => {}
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!("Shutdown signal received, executor stopped");
        Ok(())
    }

    /// Signal shutdown. A job already in flight runs to completion first.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Process the oldest pending job, if any. Returns whether one was found.
    pub async fn run_once(&self) -> WorkerResult<bool> {
        let skip = self.unrecorded.lock().await.clone();
        let Some(entry) = self.queue.next_pending_excluding(&skip).await? else {
            return Ok(false);
        };
        self.process(entry).await;
        Ok(true)
    }

    /// Drive one job to a terminal marker.
    pub async fn process(&self, entry: QueueEntry) -> JobOutcome {
        let started = Instant::now();
        let category = entry.meta.category;
        let handle = entry.handle;

        let job = match Job::from_metadata(&entry.meta) {
            Ok(job) => job,
            Err(e) => {
                let logger = JobLogger::from_string(handle.id().as_str(), category.as_str());
                let err = WorkerError::from(e);
                let outcome = self.fail(&handle, &logger, &err).await;
                metrics::record_job_failed(category, err.kind());
                self.after_terminal(category).await;
                return outcome;
            }
        };

        let logger = JobLogger::new(&job.id, job.category, job.operation);
        let span = logger.create_span();
        let outcome = async {
            logger.log_start(&format!("input {}", job.input));

            match self.execute(&job, &handle, &logger).await {
                Ok(output) => match self.finish(&job, &handle, &logger, &output).await {
                    Ok(()) => {
                        metrics::record_job_completed(job.category, job.operation, started.elapsed().as_secs_f64());
                        JobOutcome::Finished(output)
                    }
                    Err(e) => {
                        metrics::record_job_failed(job.category, e.kind());
                        self.fail(&handle, &logger, &e).await
                    }
                },
                Err(e) => {
                    metrics::record_job_failed(job.category, e.kind());
                    self.fail(&handle, &logger, &e).await
                }
            }
        }
        .instrument(span)
        .await;

        self.after_terminal(category).await;
        outcome
    }

    async fn execute(&self, job: &Job, handle: &JobHandle, logger: &JobLogger) -> WorkerResult<HandlerOutput> {
        let handler = self
            .handlers
            .get(job.category, job.operation)
            .ok_or(WorkerError::Unsupported {
                category: job.category,
                operation: job.operation,
            })?;

        let status = self.queue.status();
        status
            .write_status(handle, JobStage::Receiving, None, None)
            .await?;

        let ctx = JobContext {
            job,
            handle,
            store: self.queue.store(),
            status,
            config: &self.config,
            logger,
        };

        debug!(job_id = %job.id, handler = handler.name(), "Dispatching job");
        let mut engine = self.engine.lock().await;
        handler.handle(&ctx, &mut engine).await
    }

    async fn finish(
        &self,
        job: &Job,
        handle: &JobHandle,
        logger: &JobLogger,
        output: &HandlerOutput,
    ) -> WorkerResult<()> {
        self.queue.store().store_timing(handle, &output.timing).await?;
        let note = output.timing.display();
        self.queue
            .status()
            .mark_finished(handle, Some(&note), Some(output.progress))
            .await?;
        logger.log_completion(&format!("{} {}", job.category, note));
        Ok(())
    }

    async fn fail(&self, handle: &JobHandle, logger: &JobLogger, err: &WorkerError) -> JobOutcome {
        let message = err.to_string();
        logger.log_error(&message);

        if let Err(e) = self.queue.store().clear_work(handle).await {
            logger.log_warning(&format!("failed to clear work files: {}", e));
        }
        if let Err(e) = self.queue.status().mark_failed(handle, &message).await {
            logger.log_error(&format!("failed to record failure, skipping job until restart: {}", e));
            self.unrecorded.lock().await.insert(handle.id().clone());
        }
        JobOutcome::Failed(message)
    }

    async fn after_terminal(&self, category: Category) {
        match self.retention.enforce(category).await {
            Ok(purged) => metrics::record_retention_purged(category, purged),
            Err(e) => warn!("Retention sweep for {} failed: {}", category, e),
        }
    }
}
