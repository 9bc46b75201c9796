use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// ---------------------------------------------------------------------------
// Job failure taxonomy
// ---------------------------------------------------------------------------

/// Classification of a terminal job failure.
///
/// Serialised names are part of the status API contract and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// The job named a model that is not in the catalog.
    #[serde(rename = "UnknownModelError")]
    UnknownModel,
    /// The adapter failed to initialise. Retryable on the next access.
    #[serde(rename = "ModelLoadError")]
    ModelLoad,
    /// The requested overlay is not known to the loaded adapter.
    #[serde(rename = "UnknownOverlayError")]
    UnknownOverlay,
    /// Object storage fetch or store failed.
    #[serde(rename = "TransferError")]
    Transfer,
    /// Status query for an id the store has never seen.
    #[serde(rename = "UnknownJobError")]
    UnknownJob,
    /// The adapter failed while running inference.
    #[serde(rename = "InferenceError")]
    Inference,
    /// The job exceeded the executor watchdog.
    #[serde(rename = "Timeout")]
    Timeout,
    /// The job parameters did not match the job kind's requirements.
    #[serde(rename = "InvalidParameters")]
    InvalidParameters,
    /// The named model's adapter does not serve this job kind.
    #[serde(rename = "IncompatibleModelError")]
    IncompatibleModel,
    /// Worker-side bug or shutdown; never carries implementation detail.
    #[serde(rename = "InternalError")]
    Internal,
}

impl FailureKind {
    /// Name used in serialised results and log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownModel => "UnknownModelError",
            Self::ModelLoad => "ModelLoadError",
            Self::UnknownOverlay => "UnknownOverlayError",
            Self::Transfer => "TransferError",
            Self::UnknownJob => "UnknownJobError",
            Self::Inference => "InferenceError",
            Self::Timeout => "Timeout",
            Self::InvalidParameters => "InvalidParameters",
            Self::IncompatibleModel => "IncompatibleModelError",
            Self::Internal => "InternalError",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-readable cause recorded on a FAILURE result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl JobFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<CoreError> for JobFailure {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => Self::new(FailureKind::InvalidParameters, msg),
            CoreError::Config(msg) | CoreError::Internal(msg) => {
                Self::new(FailureKind::Internal, msg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_kind_serialises_to_taxonomy_names() {
        let json = serde_json::to_value(FailureKind::UnknownModel).unwrap();
        assert_eq!(json, "UnknownModelError");
        let json = serde_json::to_value(FailureKind::Timeout).unwrap();
        assert_eq!(json, "Timeout");
    }

    #[test]
    fn as_str_matches_serde_name() {
        for kind in [
            FailureKind::UnknownModel,
            FailureKind::ModelLoad,
            FailureKind::UnknownOverlay,
            FailureKind::Transfer,
            FailureKind::UnknownJob,
            FailureKind::Inference,
            FailureKind::Timeout,
            FailureKind::InvalidParameters,
            FailureKind::IncompatibleModel,
            FailureKind::Internal,
        ] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
        }
    }

    #[test]
    fn validation_error_becomes_invalid_parameters() {
        let failure = JobFailure::from(CoreError::Validation("prompt is empty".into()));
        assert_eq!(failure.kind, FailureKind::InvalidParameters);
        assert_eq!(failure.to_string(), "InvalidParameters: prompt is empty");
    }
}
