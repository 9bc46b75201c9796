use std::sync::Arc;

use atelier_broker::JobBroker;
use atelier_events::EventBus;
use atelier_pipeline::ModelCache;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything inside is behind `Arc` or already `Clone`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Client side of the job broker.
    pub broker: JobBroker,
    /// Shared model cache, read for catalog and load-state reporting.
    pub cache: Arc<ModelCache>,
    /// Job lifecycle events.
    pub event_bus: Arc<EventBus>,
}
