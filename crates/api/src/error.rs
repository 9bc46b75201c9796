use atelier_broker::BrokerError;
use atelier_core::error::CoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Implements [`IntoResponse`] to produce consistent `{error, code}` JSON.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `atelier_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A broker error (unknown job, queue unavailable).
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// A job id that does not even parse; no such job can exist.
    #[error("Unknown job: {0}")]
    UnknownJob(String),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

const INTERNAL_MESSAGE: &str = "An internal error occurred";

impl AppError {
    /// HTTP status, stable machine-readable code and client-facing message.
    ///
    /// Internal details are logged here and never sent to the client.
    fn classify(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Core(CoreError::Validation(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::UnknownJob(_) | AppError::Broker(BrokerError::UnknownJob(_)) => {
                (StatusCode::NOT_FOUND, "UNKNOWN_JOB", self.to_string())
            }
            AppError::Broker(BrokerError::QueueFull | BrokerError::QueueClosed) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "QUEUE_UNAVAILABLE",
                "The job queue is not accepting work right now".to_string(),
            ),
            AppError::Core(CoreError::Config(_) | CoreError::Internal(_))
            | AppError::Broker(BrokerError::DuplicateJob(_) | BrokerError::InvalidTransition { .. }) => {
                tracing::error!(error = %self, "Request failed with an internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    INTERNAL_MESSAGE.to_string(),
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.classify();
        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use atelier_core::types::new_job_id;

    use super::*;

    #[test]
    fn unknown_job_from_either_source_is_404() {
        let (status, code, _) = AppError::UnknownJob("abc".into()).classify();
        assert_eq!((status, code), (StatusCode::NOT_FOUND, "UNKNOWN_JOB"));

        let (status, code, _) = AppError::Broker(BrokerError::UnknownJob(new_job_id())).classify();
        assert_eq!((status, code), (StatusCode::NOT_FOUND, "UNKNOWN_JOB"));
    }

    #[test]
    fn full_queue_is_503() {
        let (status, _, _) = AppError::Broker(BrokerError::QueueFull).classify();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let (status, code, message) =
            AppError::Core(CoreError::Internal("db password is hunter2".into())).classify();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(code, "INTERNAL_ERROR");
        assert_eq!(message, INTERNAL_MESSAGE);
    }
}
