//! Handlers for the `/jobs` resource.
//!
//! Submission validates the request shape and the kind-specific parameters
//! before anything is queued. Whether the named model exists is decided by
//! the worker, so an unknown model surfaces as a FAILURE status rather than
//! a rejected request.

use atelier_core::error::CoreError;
use atelier_core::job::{JobKind, JobRecord, JobStatus};
use atelier_core::params::JobParameters;
use atelier_core::types::JobId;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::query::JobListParams;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /jobs`.
#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub kind: JobKind,
    /// Catalog model name; the configured default for `kind` when omitted.
    pub model_name: Option<String>,
    #[serde(default = "empty_object")]
    pub parameters: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Body of a successful submission.
#[derive(Debug, Serialize)]
pub struct SubmittedJob {
    pub job_id: JobId,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Validate and enqueue a job. Returns 201 with the new job id.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(input): Json<SubmitJobRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<SubmittedJob>>)> {
    let model_name = match input.model_name {
        Some(name) if name.trim().is_empty() => {
            return Err(AppError::BadRequest("model_name must not be blank".into()));
        }
        Some(name) => name,
        None => state.config.default_model(input.kind).to_string(),
    };

    JobParameters::parse(input.kind, &input.parameters)?;

    let job_id = state
        .broker
        .submit(input.kind, model_name, input.parameters)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: SubmittedJob { job_id },
        }),
    ))
}

/// GET /api/v1/jobs/{id}
///
/// Current record of one job. Ids that are not UUIDs cannot name a job and
/// answer 404 like any other unknown id.
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<DataResponse<JobRecord>>> {
    let job_id: JobId = id
        .parse()
        .map_err(|_| AppError::UnknownJob(id.clone()))?;

    let record = state.broker.status(job_id).await?;
    Ok(Json(DataResponse { data: record }))
}

/// GET /api/v1/jobs?status=&limit=
///
/// Most recent jobs first, optionally filtered by status.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobListParams>,
) -> AppResult<Json<DataResponse<Vec<JobRecord>>>> {
    let status = match params.status.as_deref() {
        None => None,
        Some(raw) => Some(JobStatus::parse(raw).ok_or_else(|| {
            AppError::Core(CoreError::Validation(format!("Unknown job status: {raw}")))
        })?),
    };

    let records = state.broker.list(status, params.limit()).await;
    Ok(Json(DataResponse { data: records }))
}
