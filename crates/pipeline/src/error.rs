use std::time::Duration;

use atelier_adapters::AdapterError;
use atelier_core::error::{CoreError, FailureKind, JobFailure};
use atelier_core::job::JobKind;
use atelier_storage::TransferError;

use crate::cache::CacheError;

/// Why a pipeline step stopped a job.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Parameters(#[from] CoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("Model '{model}' serves {serves} jobs and cannot run {requested} jobs")]
    IncompatibleModel {
        model: String,
        serves: JobKind,
        requested: JobKind,
    },

    #[error("Job exceeded the time limit of {}s", .0.as_secs())]
    Timeout(Duration),

    /// The adapter returned something the pipeline cannot store.
    #[error("Inference produced an unusable artifact: {0}")]
    Artifact(String),

    #[error("Scratch directory error: {0}")]
    Scratch(#[source] std::io::Error),
}

impl ExecutionError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Parameters(CoreError::Validation(_)) => FailureKind::InvalidParameters,
            Self::Parameters(_) => FailureKind::Internal,
            Self::Cache(CacheError::UnknownModel(_)) => FailureKind::UnknownModel,
            Self::Cache(CacheError::ModelLoad { .. }) => FailureKind::ModelLoad,
            Self::Adapter(e) => match e {
                AdapterError::UnknownOverlay { .. } => FailureKind::UnknownOverlay,
                AdapterError::Load(_) | AdapterError::NoLoader(_) => FailureKind::ModelLoad,
                AdapterError::InvalidInput(_) => FailureKind::InvalidParameters,
                AdapterError::Unsupported { .. } => FailureKind::IncompatibleModel,
                AdapterError::Inference(_) | AdapterError::ModelServer(_) => FailureKind::Inference,
            },
            Self::Transfer(_) => FailureKind::Transfer,
            Self::IncompatibleModel { .. } => FailureKind::IncompatibleModel,
            Self::Timeout(_) => FailureKind::Timeout,
            Self::Artifact(_) => FailureKind::Inference,
            Self::Scratch(_) => FailureKind::Internal,
        }
    }
}

impl From<ExecutionError> for JobFailure {
    fn from(err: ExecutionError) -> Self {
        let kind = err.failure_kind();
        let message = match kind {
            // Internal detail stays in the worker log.
            FailureKind::Internal => "internal error while running the job".to_string(),
            _ => err.to_string(),
        };
        JobFailure::new(kind, message)
    }
}

#[cfg(test)]
mod tests {
    use atelier_core::locator::Locator;

    use super::*;

    #[test]
    fn maps_to_taxonomy() {
        let cases = [
            (
                ExecutionError::Cache(CacheError::UnknownModel("x".into())),
                FailureKind::UnknownModel,
            ),
            (
                ExecutionError::Adapter(AdapterError::UnknownOverlay {
                    requested: "x".into(),
                    known: vec![],
                }),
                FailureKind::UnknownOverlay,
            ),
            (
                ExecutionError::Transfer(TransferError::NotFound(Locator::new("mem://a"))),
                FailureKind::Transfer,
            ),
            (
                ExecutionError::Timeout(Duration::from_secs(5)),
                FailureKind::Timeout,
            ),
            (
                ExecutionError::Parameters(CoreError::Validation("bad".into())),
                FailureKind::InvalidParameters,
            ),
        ];
        for (err, kind) in cases {
            assert_eq!(err.failure_kind(), kind);
        }
    }

    #[test]
    fn internal_failures_are_sanitised() {
        let err = ExecutionError::Scratch(std::io::Error::other("/secret/path: denied"));
        let failure = JobFailure::from(err);
        assert_eq!(failure.kind, FailureKind::Internal);
        assert!(!failure.message.contains("/secret"));
    }

    #[test]
    fn unknown_model_message_names_the_model() {
        let failure = JobFailure::from(ExecutionError::Cache(CacheError::UnknownModel(
            "nonexistent".into(),
        )));
        assert_eq!(failure.message, "Unknown model: nonexistent");
    }
}
