//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! The broker publishes a [`JobEvent`] for every status transition it
//! records. Subscribers (log sinks, tests, future push channels) observe
//! them without polling the status store.

use atelier_core::error::JobFailure;
use atelier_core::job::{JobKind, JobStatus};
use atelier_core::types::{JobId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// JobEvent
// ---------------------------------------------------------------------------

/// A job moved to `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: JobId,
    pub kind: JobKind,
    pub model_name: String,
    pub status: JobStatus,

    /// Set on `FAILURE` transitions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,

    pub timestamp: Timestamp,
}

impl JobEvent {
    pub fn new(job_id: JobId, kind: JobKind, model_name: impl Into<String>, status: JobStatus) -> Self {
        Self {
            job_id,
            kind,
            model_name: model_name.into(),
            status,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_error(mut self, error: JobFailure) -> Self {
        self.error = Some(error);
        self
    }

    /// Dot-separated name for log lines, e.g. `"job.running"`.
    pub fn event_type(&self) -> String {
        format!("job.{}", self.status.as_str().to_ascii_lowercase())
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus. Shared as `Arc<EventBus>`.
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. Dropped if there are none.
    pub fn publish(&self, event: JobEvent) {
        tracing::trace!(job_id = %event.job_id, event_type = %event.event_type(), "Publishing job event");
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use atelier_core::error::FailureKind;
    use atelier_core::types::new_job_id;

    use super::*;

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let id = new_job_id();

        bus.publish(JobEvent::new(id, JobKind::TextToImage, "sd", JobStatus::Running));

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.job_id, id);
        assert_eq!(received.status, JobStatus::Running);
        assert_eq!(received.event_type(), "job.running");
        assert!(received.error.is_none());
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let failure = JobFailure::new(FailureKind::UnknownModel, "Unknown model: x");
        bus.publish(
            JobEvent::new(new_job_id(), JobKind::ImageTo3d, "x", JobStatus::Failure).with_error(failure),
        );

        let e1 = rx1.recv().await.expect("subscriber 1 should receive");
        let e2 = rx2.recv().await.expect("subscriber 2 should receive");
        assert_eq!(e1.event_type(), "job.failure");
        assert_eq!(e2.error.unwrap().kind, FailureKind::UnknownModel);
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(JobEvent::new(new_job_id(), JobKind::TextToImage, "sd", JobStatus::Pending));
    }

    #[test]
    fn serializes_without_empty_error() {
        let event = JobEvent::new(new_job_id(), JobKind::TextToImage, "sd", JobStatus::Success);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "SUCCESS");
        assert_eq!(json["kind"], "text-to-image");
        assert!(json.get("error").is_none());
    }
}
