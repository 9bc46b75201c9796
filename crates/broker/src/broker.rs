use std::sync::Arc;

use atelier_core::error::{FailureKind, JobFailure};
use atelier_core::job::{JobDescriptor, JobKind, JobOutcome, JobRecord, JobStatus};
use atelier_core::types::{JobId, Timestamp};
use atelier_events::{EventBus, JobEvent};
use chrono::Utc;

use crate::error::BrokerError;
use crate::queue::JobQueue;
use crate::store::StatusStore;

/// Client-facing side: submit jobs and query their status.
///
/// Parameters are carried as opaque JSON; validating them is the caller's
/// and the executor's business.
#[derive(Clone)]
pub struct JobBroker {
    store: Arc<dyn StatusStore>,
    queue: Arc<dyn JobQueue>,
    events: Arc<EventBus>,
}

impl JobBroker {
    pub fn new(store: Arc<dyn StatusStore>, queue: Arc<dyn JobQueue>, events: Arc<EventBus>) -> Self {
        Self {
            store,
            queue,
            events,
        }
    }

    /// Worker-facing handle over the same store, queue and bus.
    pub fn worker_channel(&self) -> WorkerChannel {
        WorkerChannel {
            store: Arc::clone(&self.store),
            queue: Arc::clone(&self.queue),
            events: Arc::clone(&self.events),
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Accept a job: record it PENDING, enqueue it, return its id.
    ///
    /// If the queue refuses the job, the record is failed immediately so
    /// that no job id ever stays PENDING without a worker able to see it.
    pub async fn submit(
        &self,
        kind: JobKind,
        model_name: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Result<JobId, BrokerError> {
        let descriptor = JobDescriptor::new(kind, model_name, parameters);
        let job_id = descriptor.job_id;

        self.store.insert(JobRecord::pending(&descriptor)).await?;
        self.events.publish(JobEvent::new(
            job_id,
            kind,
            descriptor.model_name.clone(),
            JobStatus::Pending,
        ));

        let model_name = descriptor.model_name.clone();
        if let Err(e) = self.queue.enqueue(descriptor).await {
            tracing::error!(%job_id, error = %e, "Failed to enqueue job");
            let failure = JobFailure::new(FailureKind::Internal, "job could not be queued");
            record_terminal(&*self.store, &self.events, job_id, kind, &model_name, Err(failure))
                .await;
            return Err(e);
        }

        tracing::info!(%job_id, %kind, model = %model_name, "Job submitted");
        Ok(job_id)
    }

    pub async fn status(&self, job_id: JobId) -> Result<JobRecord, BrokerError> {
        self.store
            .get(job_id)
            .await
            .ok_or(BrokerError::UnknownJob(job_id))
    }

    pub async fn list(&self, status: Option<JobStatus>, limit: usize) -> Vec<JobRecord> {
        self.store.list(status, limit).await
    }

    /// Retention: drop terminal records completed before `cutoff`.
    pub async fn purge_terminal_before(&self, cutoff: Timestamp) -> usize {
        self.store.purge_terminal_before(cutoff).await
    }
}

/// Worker-facing side: take jobs and report their lifecycle.
#[derive(Clone)]
pub struct WorkerChannel {
    store: Arc<dyn StatusStore>,
    queue: Arc<dyn JobQueue>,
    events: Arc<EventBus>,
}

impl WorkerChannel {
    /// Wait for the next job. `None` once the queue is closed and empty.
    pub async fn next(&self) -> Option<JobDescriptor> {
        self.queue.dequeue().await
    }

    /// Next job if one is buffered right now.
    pub async fn try_next(&self) -> Option<JobDescriptor> {
        self.queue.try_dequeue().await
    }

    /// Stop accepting submissions.
    pub async fn close(&self) {
        self.queue.close().await;
    }

    /// PENDING -> RUNNING.
    pub async fn start(&self, descriptor: &JobDescriptor) -> Result<JobRecord, BrokerError> {
        let record = self
            .store
            .mark_running(descriptor.job_id, Utc::now())
            .await?;
        self.events.publish(JobEvent::new(
            descriptor.job_id,
            descriptor.kind,
            descriptor.model_name.clone(),
            JobStatus::Running,
        ));
        Ok(record)
    }

    /// Record the single terminal outcome of a job.
    pub async fn finish(
        &self,
        descriptor: &JobDescriptor,
        outcome: JobOutcome,
    ) -> Result<JobRecord, BrokerError> {
        let record = self
            .store
            .complete(descriptor.job_id, outcome, Utc::now())
            .await?;
        self.events.publish(terminal_event(&record));
        Ok(record)
    }
}

fn terminal_event(record: &JobRecord) -> JobEvent {
    let event = JobEvent::new(record.job_id, record.kind, record.model_name.clone(), record.status);
    match &record.error {
        Some(failure) => event.with_error(failure.clone()),
        None => event,
    }
}

async fn record_terminal(
    store: &dyn StatusStore,
    events: &EventBus,
    job_id: JobId,
    kind: JobKind,
    model_name: &str,
    outcome: JobOutcome,
) {
    match store.complete(job_id, outcome, Utc::now()).await {
        Ok(record) => events.publish(terminal_event(&record)),
        Err(e) => tracing::error!(%job_id, %kind, model = %model_name, error = %e, "Failed to record job outcome"),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use atelier_core::job::JobOutput;
    use atelier_core::locator::Locator;
    use serde_json::json;

    use super::*;
    use crate::queue::ChannelQueue;
    use crate::store::MemoryStatusStore;

    fn broker(capacity: usize) -> JobBroker {
        JobBroker::new(
            Arc::new(MemoryStatusStore::new()),
            Arc::new(ChannelQueue::new(capacity)),
            Arc::new(EventBus::default()),
        )
    }

    #[tokio::test]
    async fn submit_records_pending_and_enqueues() {
        let broker = broker(8);
        let mut events = broker.events().subscribe();

        let id = broker
            .submit(JobKind::TextToImage, "sd", json!({"prompt": "a"}))
            .await
            .unwrap();

        let record = broker.status(id).await.unwrap();
        assert_eq!(record.status, JobStatus::Pending);
        assert_eq!(record.model_name, "sd");
        assert_eq!(events.recv().await.unwrap().status, JobStatus::Pending);

        let descriptor = broker.worker_channel().try_next().await.unwrap();
        assert_eq!(descriptor.job_id, id);
        assert_eq!(descriptor.parameters["prompt"], "a");
    }

    #[tokio::test]
    async fn unknown_job_id() {
        let broker = broker(8);
        let id = atelier_core::types::new_job_id();
        assert_matches!(broker.status(id).await, Err(BrokerError::UnknownJob(unknown)) if unknown == id);
    }

    #[tokio::test]
    async fn worker_lifecycle_publishes_each_transition() {
        let broker = broker(8);
        let channel = broker.worker_channel();
        let mut events = broker.events().subscribe();

        let id = broker
            .submit(JobKind::TextToImage, "sd", json!({"prompt": "a"}))
            .await
            .unwrap();
        let descriptor = channel.next().await.unwrap();
        channel.start(&descriptor).await.unwrap();
        let output = JobOutput {
            artifact: Locator::new("mem://outputs/images/x.png"),
            source: None,
            overlay_used: None,
        };
        channel.finish(&descriptor, Ok(output)).await.unwrap();

        let seen: Vec<JobStatus> = (0..3).map(|_| events.try_recv().unwrap().status).collect();
        assert_eq!(seen, [JobStatus::Pending, JobStatus::Running, JobStatus::Success]);
        assert_eq!(broker.status(id).await.unwrap().status, JobStatus::Success);

        let late = JobFailure::new(FailureKind::Internal, "late");
        assert_matches!(
            channel.finish(&descriptor, Err(late)).await,
            Err(BrokerError::InvalidTransition { .. })
        );
        assert_eq!(broker.status(id).await.unwrap().status, JobStatus::Success);
    }

    #[tokio::test]
    async fn queue_refusal_fails_the_record() {
        let broker = broker(1);
        broker
            .submit(JobKind::TextToImage, "sd", json!({"prompt": "a"}))
            .await
            .unwrap();

        let err = broker
            .submit(JobKind::TextToImage, "sd", json!({"prompt": "b"}))
            .await
            .unwrap_err();
        assert_matches!(err, BrokerError::QueueFull);

        let failed = broker.list(Some(JobStatus::Failure), 10).await;
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].error.as_ref().unwrap().kind, FailureKind::Internal);
        assert!(broker.list(Some(JobStatus::Pending), 10).await.len() == 1);
    }
}
