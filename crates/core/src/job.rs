//! Job descriptors, lifecycle status, and terminal results.

use serde::{Deserialize, Serialize};

use crate::error::JobFailure;
use crate::locator::Locator;
use crate::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// Kind
// ---------------------------------------------------------------------------

/// The family of work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    TextToImage,
    #[serde(rename = "image-to-3d")]
    ImageTo3d,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TextToImage => "text-to-image",
            Self::ImageTo3d => "image-to-3d",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Job lifecycle status.
///
/// `Pending` and `Running` are transient; `Success` and `Failure` are
/// terminal and never change once written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failure,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }

    /// Whether the store may move a record from `self` to `next`.
    ///
    /// Allowed: `Pending -> Running`, `Pending -> terminal`,
    /// `Running -> terminal`. Everything else is a regression or a
    /// duplicate terminal write.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Running) => true,
            (Self::Pending | Self::Running, n) => n.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        }
    }

    /// Parse the wire name (case-insensitive), used by list filters.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "PENDING" => Some(Self::Pending),
            "RUNNING" => Some(Self::Running),
            "SUCCESS" => Some(Self::Success),
            "FAILURE" => Some(Self::Failure),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// An accepted job submission. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub job_id: JobId,
    pub kind: JobKind,
    pub model_name: String,
    pub parameters: serde_json::Value,
    pub submitted_at: Timestamp,
}

impl JobDescriptor {
    /// Build a descriptor with a fresh id and the current time.
    pub fn new(kind: JobKind, model_name: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            job_id: crate::types::new_job_id(),
            kind,
            model_name: model_name.into(),
            parameters,
            submitted_at: chrono::Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// What a successful job produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutput {
    /// Where the generated artifact was stored.
    pub artifact: Locator,
    /// Input the artifact was derived from (image-to-3d).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Locator>,
    /// Overlay applied during inference (text-to-image).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay_used: Option<String>,
}

/// Terminal outcome of a pipeline execution.
pub type JobOutcome = Result<JobOutput, JobFailure>;

/// The status store's view of one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub kind: JobKind,
    pub model_name: String,
    pub status: JobStatus,
    pub output: Option<JobOutput>,
    pub error: Option<JobFailure>,
    pub submitted_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl JobRecord {
    /// A fresh PENDING record for a just-submitted descriptor.
    pub fn pending(descriptor: &JobDescriptor) -> Self {
        Self {
            job_id: descriptor.job_id,
            kind: descriptor.kind,
            model_name: descriptor.model_name.clone(),
            status: JobStatus::Pending,
            output: None,
            error: None,
            submitted_at: descriptor.submitted_at,
            started_at: None,
            completed_at: None,
        }
    }

    /// Apply a terminal outcome, stamping `completed_at`.
    pub fn complete(&mut self, outcome: JobOutcome, at: Timestamp) {
        match outcome {
            Ok(output) => {
                self.status = JobStatus::Success;
                self.output = Some(output);
            }
            Err(failure) => {
                self.status = JobStatus::Failure;
                self.error = Some(failure);
            }
        }
        self.completed_at = Some(at);
    }
}
