//! Image-to-3d adapter backed by a reconstruction session on the sidecar.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use atelier_core::model::{AdapterKind, ModelConfig, DEFAULT_MESH_INFERENCE_STEPS};
use tokio::sync::Mutex;

use crate::adapter::{AdapterLoader, Artifact, ModelAdapter, PredictInput};
use crate::client::{forwarded_options, ModelServerApi, ModelServerConfig};
use crate::error::AdapterError;

const LOCAL_OPTIONS: &[&str] = &["num_inference_steps"];

/// Loads [`MeshAdapter`] handles.
pub struct MeshLoader {
    server: ModelServerConfig,
    client: reqwest::Client,
}

impl MeshLoader {
    pub fn new(server: ModelServerConfig) -> Self {
        let client = server.http_client();
        Self { server, client }
    }
}

#[async_trait]
impl AdapterLoader for MeshLoader {
    async fn load(&self, config: &ModelConfig) -> Result<Arc<dyn ModelAdapter>, AdapterError> {
        let steps = match config.option_u64("num_inference_steps") {
            Some(0) => {
                return Err(AdapterError::Load(
                    "num_inference_steps must be positive".into(),
                ))
            }
            Some(n) => u32::try_from(n)
                .map_err(|_| AdapterError::Load(format!("num_inference_steps too large: {n}")))?,
            None => DEFAULT_MESH_INFERENCE_STEPS,
        };
        let subfolder = config.option_str("subfolder").map(str::to_string);

        let api = ModelServerApi::with_client(self.client.clone(), self.server.endpoint_for(config));
        let session = api
            .load_model(&config.backing_model_id, &forwarded_options(config, LOCAL_OPTIONS))
            .await
            .map_err(|e| AdapterError::Load(e.to_string()))?;

        tracing::info!(
            model = %config.name,
            backing_model_id = %config.backing_model_id,
            session_id = %session.session_id,
            steps,
            "Mesh model loaded",
        );

        Ok(Arc::new(MeshAdapter {
            model_name: config.name.clone(),
            api,
            session_id: session.session_id,
            steps,
            subfolder,
            lock: Mutex::new(()),
        }))
    }
}

/// Handle for one loaded reconstruction session. One predict at a time.
pub struct MeshAdapter {
    model_name: String,
    api: ModelServerApi,
    session_id: String,
    steps: u32,
    subfolder: Option<String>,
    lock: Mutex<()>,
}

impl MeshAdapter {
    async fn reconstruct(&self, image_path: &Path, output_path: &Path) -> Result<(), AdapterError> {
        let image = tokio::fs::read(image_path).await.map_err(|e| {
            AdapterError::InvalidInput(format!(
                "cannot read source image {}: {e}",
                image_path.display()
            ))
        })?;

        let _guard = self.lock.lock().await;
        let mesh = self
            .api
            .reconstruct(&self.session_id, image, self.steps, self.subfolder.as_deref())
            .await?;
        if mesh.is_empty() {
            return Err(AdapterError::Inference("model server returned an empty mesh".into()));
        }

        tokio::fs::write(output_path, &mesh).await.map_err(|e| {
            AdapterError::Inference(format!(
                "cannot write mesh to {}: {e}",
                output_path.display()
            ))
        })?;

        tracing::debug!(
            model = %self.model_name,
            bytes = mesh.len(),
            output = %output_path.display(),
            "Mesh written",
        );
        Ok(())
    }
}

#[async_trait]
impl ModelAdapter for MeshAdapter {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn adapter_kind(&self) -> AdapterKind {
        AdapterKind::Mesh
    }

    async fn predict(&self, input: PredictInput) -> Result<Artifact, AdapterError> {
        match input {
            PredictInput::ImageTo3d {
                image_path,
                output_path,
            } => {
                self.reconstruct(&image_path, &output_path).await?;
                Ok(Artifact::Mesh { path: output_path })
            }
            other => Err(AdapterError::Unsupported {
                adapter: AdapterKind::Mesh,
                kind: other.kind(),
            }),
        }
    }
}
