//! Structured log line for every job lifecycle event.

use atelier_core::job::JobStatus;
use atelier_events::JobEvent;
use tokio::sync::broadcast;

/// Consume `receiver` until the bus closes.
pub async fn run(mut receiver: broadcast::Receiver<JobEvent>) {
    loop {
        match receiver.recv().await {
            Ok(event) => log_event(&event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event log lagged behind the event bus");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    tracing::debug!("Event log stopped");
}

fn log_event(event: &JobEvent) {
    match (&event.status, &event.error) {
        (JobStatus::Failure, Some(error)) => tracing::warn!(
            job_id = %event.job_id,
            kind = %event.kind,
            model = %event.model_name,
            error_kind = %error.kind,
            error = %error.message,
            "{}",
            event.event_type(),
        ),
        _ => tracing::info!(
            job_id = %event.job_id,
            kind = %event.kind,
            model = %event.model_name,
            "{}",
            event.event_type(),
        ),
    }
}
