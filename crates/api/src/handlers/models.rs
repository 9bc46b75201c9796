use atelier_core::job::JobKind;
use atelier_core::model::AdapterKind;
use atelier_pipeline::LoadState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::response::DataResponse;
use crate::state::AppState;

/// One catalog entry as reported by `GET /models`.
#[derive(Debug, Serialize)]
pub struct ModelSummary {
    pub name: String,
    pub backing_model_id: String,
    pub adapter: AdapterKind,
    /// The job kind this model can serve.
    pub serves: JobKind,
    pub state: LoadState,
}

/// GET /api/v1/models
///
/// Every catalog model with its current cache state, ordered by name.
pub async fn list_models(State(state): State<AppState>) -> Json<DataResponse<Vec<ModelSummary>>> {
    let mut models = Vec::with_capacity(state.cache.catalog().len());
    for config in state.cache.catalog().iter() {
        models.push(ModelSummary {
            name: config.name.clone(),
            backing_model_id: config.backing_model_id.clone(),
            adapter: config.adapter,
            serves: config.adapter.serves(),
            state: state.cache.state(&config.name).await,
        });
    }
    models.sort_by(|a, b| a.name.cmp(&b.name));

    Json(DataResponse { data: models })
}
