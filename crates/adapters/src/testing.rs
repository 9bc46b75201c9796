//! In-process fakes for tests that need adapters without a sidecar.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use atelier_core::model::{AdapterKind, ModelConfig};

use crate::adapter::{AdapterLoader, Artifact, ModelAdapter, PredictInput};
use crate::error::AdapterError;
use crate::registry::AdapterRegistry;

/// PNG signature plus a fragment of an IHDR chunk; enough for format sniffing.
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

/// Bytes written as the mesh output.
pub const GLB_BYTES: &[u8] = b"glTF\x02\0\0\0";

/// Prompt that makes a fake handle panic inside `predict`.
pub const PANIC_PROMPT: &str = "__panic__";

/// Counts loads and hands out [`FakeAdapter`] handles.
pub struct FakeLoader {
    loads: AtomicUsize,
    failures_left: AtomicUsize,
    load_delay: Duration,
    predict_delay: Duration,
    overlays: Vec<String>,
}

impl FakeLoader {
    pub fn new() -> Self {
        Self {
            loads: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
            load_delay: Duration::ZERO,
            predict_delay: Duration::ZERO,
            overlays: vec!["pixel-art".into(), "watercolor".into()],
        }
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn with_predict_delay(mut self, delay: Duration) -> Self {
        self.predict_delay = delay;
        self
    }

    /// Make the next `n` loads fail.
    pub fn fail_next_loads(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Number of load attempts, failed ones included.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Registry serving every adapter family with `loader`.
    pub fn registry(loader: &Arc<Self>) -> AdapterRegistry {
        let mut registry = AdapterRegistry::new();
        registry.register(AdapterKind::Diffusion, Arc::clone(loader) as Arc<dyn AdapterLoader>);
        registry.register(AdapterKind::Mesh, Arc::clone(loader) as Arc<dyn AdapterLoader>);
        registry
    }
}

impl Default for FakeLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AdapterLoader for FakeLoader {
    async fn load(&self, config: &ModelConfig) -> Result<Arc<dyn ModelAdapter>, AdapterError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.load_delay).await;

        let fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(AdapterError::Load("simulated load failure".into()));
        }

        Ok(Arc::new(FakeAdapter {
            model_name: config.name.clone(),
            kind: config.adapter,
            overlays: self.overlays.clone(),
            predict_delay: self.predict_delay,
        }))
    }
}

/// Handle produced by [`FakeLoader`].
pub struct FakeAdapter {
    model_name: String,
    kind: AdapterKind,
    overlays: Vec<String>,
    predict_delay: Duration,
}

#[async_trait]
impl ModelAdapter for FakeAdapter {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn adapter_kind(&self) -> AdapterKind {
        self.kind
    }

    fn known_overlays(&self) -> Vec<String> {
        self.overlays.clone()
    }

    async fn predict(&self, input: PredictInput) -> Result<Artifact, AdapterError> {
        if input.kind() != self.kind.serves() {
            return Err(AdapterError::Unsupported {
                adapter: self.kind,
                kind: input.kind(),
            });
        }

        match input {
            PredictInput::TextToImage { prompt, overlay } => {
                if let Some(overlay) = overlay {
                    if !self.overlays.contains(&overlay.name) {
                        return Err(AdapterError::UnknownOverlay {
                            requested: overlay.name,
                            known: self.known_overlays(),
                        });
                    }
                }
                if prompt == PANIC_PROMPT {
                    panic!("fake adapter asked to panic");
                }
                tokio::time::sleep(self.predict_delay).await;
                Ok(Artifact::Image {
                    bytes: PNG_BYTES.to_vec(),
                })
            }
            PredictInput::ImageTo3d {
                image_path,
                output_path,
            } => {
                tokio::fs::read(&image_path)
                    .await
                    .map_err(|e| AdapterError::InvalidInput(e.to_string()))?;
                tokio::time::sleep(self.predict_delay).await;
                tokio::fs::write(&output_path, GLB_BYTES)
                    .await
                    .map_err(|e| AdapterError::Inference(e.to_string()))?;
                Ok(Artifact::Mesh { path: output_path })
            }
        }
    }
}
