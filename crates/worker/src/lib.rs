//! Job worker.
//!
//! Pulls descriptors from the broker's [`WorkerChannel`] and runs each one
//! on its own task through the [`JobExecutor`], at most
//! [`WorkerConfig::concurrency`] at a time. Every dequeued job receives
//! exactly one terminal outcome, including when its task panics or the
//! worker shuts down before starting it.

use std::sync::Arc;

use atelier_broker::WorkerChannel;
use atelier_core::error::{FailureKind, JobFailure};
use atelier_core::job::JobDescriptor;
use atelier_pipeline::JobExecutor;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Default number of jobs executed at once.
const DEFAULT_CONCURRENCY: usize = 2;

/// Message recorded for jobs still queued at shutdown.
pub const SHUTDOWN_MESSAGE: &str = "worker shut down before the job started";

/// Worker settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub concurrency: usize,
}

impl WorkerConfig {
    /// Load from environment variables with defaults.
    ///
    /// | Env Var              | Default |
    /// |----------------------|---------|
    /// | `WORKER_CONCURRENCY` | `2`     |
    pub fn from_env() -> Self {
        let concurrency: usize = std::env::var("WORKER_CONCURRENCY")
            .unwrap_or_else(|_| DEFAULT_CONCURRENCY.to_string())
            .parse()
            .expect("WORKER_CONCURRENCY must be a valid usize");
        assert!(concurrency > 0, "WORKER_CONCURRENCY must be at least 1");

        Self { concurrency }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Long-lived consumer of the job queue.
pub struct Worker {
    channel: WorkerChannel,
    executor: Arc<JobExecutor>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(channel: WorkerChannel, executor: Arc<JobExecutor>, config: WorkerConfig) -> Self {
        Self {
            channel,
            executor,
            config,
        }
    }

    /// Run until `cancel` fires or the queue closes, then drain.
    pub async fn run(&self, cancel: CancellationToken) {
        let permits = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut in_flight = JoinSet::new();

        tracing::info!(concurrency = self.config.concurrency, "Worker started");

        loop {
            // A slot is reserved before dequeuing so a taken job starts at once.
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let descriptor = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = self.channel.next() => match next {
                    Some(descriptor) => descriptor,
                    None => {
                        tracing::info!("Job queue closed");
                        break;
                    }
                },
            };

            while let Some(joined) = in_flight.try_join_next() {
                log_join(joined);
            }

            in_flight.spawn(run_job(
                self.channel.clone(),
                Arc::clone(&self.executor),
                descriptor,
                permit,
            ));
        }

        tracing::info!(in_flight = in_flight.len(), "Worker shutting down");
        self.channel.close().await;

        while let Some(joined) = in_flight.join_next().await {
            log_join(joined);
        }

        let abandoned = self.fail_queued().await;
        tracing::info!(abandoned, "Worker stopped");
    }

    /// Fail every job still buffered in the queue.
    async fn fail_queued(&self) -> usize {
        let mut count = 0;
        while let Some(descriptor) = self.channel.try_next().await {
            let failure = JobFailure::new(FailureKind::Internal, SHUTDOWN_MESSAGE);
            if let Err(e) = self.channel.finish(&descriptor, Err(failure)).await {
                tracing::error!(job_id = %descriptor.job_id, error = %e, "Failed to record abandoned job");
            }
            count += 1;
        }
        count
    }
}

/// Execute one job and record its outcome. Holds `_permit` until done.
async fn run_job(
    channel: WorkerChannel,
    executor: Arc<JobExecutor>,
    descriptor: JobDescriptor,
    _permit: OwnedSemaphorePermit,
) {
    let job_id = descriptor.job_id;

    if let Err(e) = channel.start(&descriptor).await {
        tracing::warn!(%job_id, error = %e, "Skipping job that could not be started");
        return;
    }
    tracing::info!(%job_id, kind = %descriptor.kind, model = %descriptor.model_name, "Job started");

    // The execution runs on its own task so a panic surfaces as a JoinError.
    let execution = tokio::spawn({
        let descriptor = descriptor.clone();
        async move { executor.execute(&descriptor).await }
    });

    let outcome = match execution.await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(%job_id, error = %e, "Job task aborted");
            Err(JobFailure::new(
                FailureKind::Internal,
                "job aborted unexpectedly",
            ))
        }
    };

    if let Err(e) = channel.finish(&descriptor, outcome).await {
        tracing::error!(%job_id, error = %e, "Failed to record job outcome");
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "Worker job task failed");
    }
}
