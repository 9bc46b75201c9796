pub mod health;
pub mod jobs;
pub mod models;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /jobs                 list (GET), submit (POST)
/// /jobs/{id}            status (GET)
///
/// /models               catalog with load state (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/jobs", jobs::router())
        .nest("/models", models::router())
}
