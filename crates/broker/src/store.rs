//! Job status records.

use std::collections::HashMap;

use async_trait::async_trait;
use atelier_core::job::{JobOutcome, JobRecord, JobStatus};
use atelier_core::types::{JobId, Timestamp};
use tokio::sync::RwLock;

use crate::error::BrokerError;

/// Owns the lifecycle record of every known job.
///
/// Implementations must enforce [`JobStatus::can_transition_to`]: a
/// record only moves forward and a terminal record never changes.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Record a new PENDING job.
    async fn insert(&self, record: JobRecord) -> Result<(), BrokerError>;

    async fn get(&self, job_id: JobId) -> Option<JobRecord>;

    /// PENDING -> RUNNING, stamping `started_at`.
    async fn mark_running(&self, job_id: JobId, at: Timestamp) -> Result<JobRecord, BrokerError>;

    /// Write the single terminal outcome, stamping `completed_at`.
    async fn complete(
        &self,
        job_id: JobId,
        outcome: JobOutcome,
        at: Timestamp,
    ) -> Result<JobRecord, BrokerError>;

    /// Most recently submitted first, optionally filtered by status.
    async fn list(&self, status: Option<JobStatus>, limit: usize) -> Vec<JobRecord>;

    /// Drop terminal records completed before `cutoff`. Returns the count.
    async fn purge_terminal_before(&self, cutoff: Timestamp) -> usize;
}

/// In-memory [`StatusStore`].
#[derive(Default)]
pub struct MemoryStatusStore {
    records: RwLock<HashMap<JobId, JobRecord>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

fn check_transition(record: &JobRecord, next: JobStatus) -> Result<(), BrokerError> {
    if record.status.can_transition_to(next) {
        return Ok(());
    }
    tracing::warn!(
        job_id = %record.job_id,
        from = %record.status,
        to = %next,
        "Rejected job status transition",
    );
    Err(BrokerError::InvalidTransition {
        job_id: record.job_id,
        from: record.status,
        to: next,
    })
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn insert(&self, record: JobRecord) -> Result<(), BrokerError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.job_id) {
            return Err(BrokerError::DuplicateJob(record.job_id));
        }
        records.insert(record.job_id, record);
        Ok(())
    }

    async fn get(&self, job_id: JobId) -> Option<JobRecord> {
        self.records.read().await.get(&job_id).cloned()
    }

    async fn mark_running(&self, job_id: JobId, at: Timestamp) -> Result<JobRecord, BrokerError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&job_id)
            .ok_or(BrokerError::UnknownJob(job_id))?;
        check_transition(record, JobStatus::Running)?;
        record.status = JobStatus::Running;
        record.started_at = Some(at);
        Ok(record.clone())
    }

    async fn complete(
        &self,
        job_id: JobId,
        outcome: JobOutcome,
        at: Timestamp,
    ) -> Result<JobRecord, BrokerError> {
        let next = match outcome {
            Ok(_) => JobStatus::Success,
            Err(_) => JobStatus::Failure,
        };
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&job_id)
            .ok_or(BrokerError::UnknownJob(job_id))?;
        check_transition(record, next)?;
        record.complete(outcome, at);
        Ok(record.clone())
    }

    async fn list(&self, status: Option<JobStatus>, limit: usize) -> Vec<JobRecord> {
        let records = self.records.read().await;
        let mut matching: Vec<JobRecord> = records
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        // UUIDv7 ids sort by creation time; they break submitted_at ties.
        matching.sort_by(|a, b| {
            b.submitted_at
                .cmp(&a.submitted_at)
                .then_with(|| b.job_id.cmp(&a.job_id))
        });
        matching.truncate(limit);
        matching
    }

    async fn purge_terminal_before(&self, cutoff: Timestamp) -> usize {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| {
            !(r.status.is_terminal() && r.completed_at.is_some_and(|at| at < cutoff))
        });
        before - records.len()
    }
}
