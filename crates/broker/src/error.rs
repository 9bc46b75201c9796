use atelier_core::job::JobStatus;
use atelier_core::types::JobId;

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Unknown job: {0}")]
    UnknownJob(JobId),

    #[error("Job {0} already exists")]
    DuplicateJob(JobId),

    /// Refused status change (regression or second terminal write).
    #[error("Job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Job queue is full")]
    QueueFull,

    #[error("Job queue is closed")]
    QueueClosed,
}
