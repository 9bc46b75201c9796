//! Text-to-image adapter backed by a diffusion session on the sidecar.
//!
//! Overlays are applied for a single predict call and removed before the
//! call returns. The apply/generate/remove sequence runs on its own task
//! while holding the session lock, so a caller that stops waiting cannot
//! leave an overlay attached for the next job.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use atelier_core::model::{AdapterKind, ModelConfig, DEFAULT_OVERLAY_STRENGTH};
use tokio::sync::Mutex;

use crate::adapter::{AdapterLoader, Artifact, ModelAdapter, OverlayRequest, PredictInput};
use crate::client::{forwarded_options, ModelServerApi, ModelServerConfig};
use crate::error::AdapterError;
use crate::overlay::discover_overlays;

/// Option keys interpreted locally and never sent to the sidecar.
const LOCAL_OPTIONS: &[&str] = &["overlay_dir", "default_overlay_strength"];

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Loads [`DiffusionAdapter`] handles.
pub struct DiffusionLoader {
    server: ModelServerConfig,
    client: reqwest::Client,
}

impl DiffusionLoader {
    pub fn new(server: ModelServerConfig) -> Self {
        let client = server.http_client();
        Self { server, client }
    }
}

#[async_trait]
impl AdapterLoader for DiffusionLoader {
    async fn load(&self, config: &ModelConfig) -> Result<Arc<dyn ModelAdapter>, AdapterError> {
        let default_strength = config
            .option_f64("default_overlay_strength")
            .unwrap_or(DEFAULT_OVERLAY_STRENGTH);

        let overlays = match config.option_str("overlay_dir") {
            Some(dir) => discover_overlays(Path::new(dir)).await.map_err(|e| {
                AdapterError::Load(format!("cannot scan overlay directory '{dir}': {e}"))
            })?,
            None => BTreeMap::new(),
        };

        let api = ModelServerApi::with_client(self.client.clone(), self.server.endpoint_for(config));
        let session = api
            .load_model(&config.backing_model_id, &forwarded_options(config, LOCAL_OPTIONS))
            .await
            .map_err(|e| AdapterError::Load(e.to_string()))?;

        tracing::info!(
            model = %config.name,
            backing_model_id = %config.backing_model_id,
            session_id = %session.session_id,
            overlays = overlays.len(),
            "Diffusion model loaded",
        );

        Ok(Arc::new(DiffusionAdapter {
            model_name: config.name.clone(),
            api,
            session_id: session.session_id,
            overlays,
            default_strength,
            session: Arc::new(Mutex::new(SessionState::default())),
        }))
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Mutable per-session state, guarded by the session lock.
#[derive(Debug, Default)]
struct SessionState {
    /// Overlay that may still be attached after a failed removal.
    stale_overlay: Option<String>,
}

/// A resolved overlay ready to send to the sidecar.
#[derive(Debug, Clone)]
struct ResolvedOverlay {
    name: String,
    path: String,
    strength: f64,
}

/// Handle for one loaded diffusion session.
pub struct DiffusionAdapter {
    model_name: String,
    api: ModelServerApi,
    session_id: String,
    overlays: BTreeMap<String, PathBuf>,
    default_strength: f64,
    session: Arc<Mutex<SessionState>>,
}

impl DiffusionAdapter {
    fn resolve_overlay(&self, request: &OverlayRequest) -> Result<ResolvedOverlay, AdapterError> {
        let path = self
            .overlays
            .get(&request.name)
            .ok_or_else(|| AdapterError::UnknownOverlay {
                requested: request.name.clone(),
                known: self.known_overlays(),
            })?;

        let strength = request.strength.unwrap_or(self.default_strength);
        if !(0.0..=1.0).contains(&strength) {
            return Err(AdapterError::InvalidInput(format!(
                "overlay strength must be within [0, 1] (got {strength})"
            )));
        }

        Ok(ResolvedOverlay {
            name: request.name.clone(),
            path: path.to_string_lossy().into_owned(),
            strength,
        })
    }
}

#[async_trait]
impl ModelAdapter for DiffusionAdapter {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn adapter_kind(&self) -> AdapterKind {
        AdapterKind::Diffusion
    }

    fn known_overlays(&self) -> Vec<String> {
        self.overlays.keys().cloned().collect()
    }

    async fn predict(&self, input: PredictInput) -> Result<Artifact, AdapterError> {
        let kind = input.kind();
        let PredictInput::TextToImage { prompt, overlay } = input else {
            return Err(AdapterError::Unsupported {
                adapter: AdapterKind::Diffusion,
                kind,
            });
        };

        // Rejected before the session is touched.
        let overlay = overlay.as_ref().map(|o| self.resolve_overlay(o)).transpose()?;

        let api = self.api.clone();
        let session_id = self.session_id.clone();
        let model = self.model_name.clone();
        let session = Arc::clone(&self.session);

        let task = tokio::spawn(async move {
            let mut state = session.lock_owned().await;
            generate(&api, &session_id, &model, &mut state, &prompt, overlay.as_ref()).await
        });

        let bytes = task
            .await
            .map_err(|e| AdapterError::Inference(format!("generation task failed: {e}")))??;

        Ok(Artifact::Image { bytes })
    }
}

/// Run one generation with the session lock held.
async fn generate(
    api: &ModelServerApi,
    session_id: &str,
    model: &str,
    state: &mut SessionState,
    prompt: &str,
    overlay: Option<&ResolvedOverlay>,
) -> Result<Vec<u8>, AdapterError> {
    if let Some(stale) = state.stale_overlay.take() {
        if let Err(e) = api.remove_overlay(session_id).await {
            let message = format!("session still carries overlay '{stale}': {e}");
            state.stale_overlay = Some(stale);
            return Err(AdapterError::Inference(message));
        }
        tracing::info!(model, overlay = %stale, "Removed stale overlay");
    }

    let Some(overlay) = overlay else {
        return Ok(api.generate(session_id, prompt).await?);
    };

    tracing::debug!(
        model,
        overlay = %overlay.name,
        strength = overlay.strength,
        "Applying overlay",
    );

    // Marked before applying: a failed apply may still have attached it.
    state.stale_overlay = Some(overlay.name.clone());

    let result = match api.apply_overlay(session_id, &overlay.path, overlay.strength).await {
        Ok(()) => api.generate(session_id, prompt).await.map_err(AdapterError::from),
        Err(e) => Err(AdapterError::from(e)),
    };

    match api.remove_overlay(session_id).await {
        Ok(()) => {
            state.stale_overlay = None;
            tracing::debug!(model, overlay = %overlay.name, "Overlay removed");
            result
        }
        Err(e) => {
            tracing::error!(
                model,
                overlay = %overlay.name,
                error = %e,
                "Failed to remove overlay",
            );
            match result {
                Err(inference) => Err(inference),
                Ok(_) => Err(AdapterError::Inference(format!(
                    "overlay '{}' could not be removed: {e}",
                    overlay.name
                ))),
            }
        }
    }
}
