use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use atelier_core::job::JobKind;
use atelier_core::model::{AdapterKind, ModelConfig};

use crate::error::AdapterError;

/// A transient weight adjustment requested for a single predict call.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayRequest {
    pub name: String,
    /// Strength in `[0, 1]`. `None` uses the model's configured default.
    pub strength: Option<f64>,
}

/// Job-specific inputs to [`ModelAdapter::predict`].
#[derive(Debug, Clone, PartialEq)]
pub enum PredictInput {
    TextToImage {
        prompt: String,
        overlay: Option<OverlayRequest>,
    },
    ImageTo3d {
        /// Local copy of the source image.
        image_path: PathBuf,
        /// Where the adapter must write the generated mesh.
        output_path: PathBuf,
    },
}

impl PredictInput {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::TextToImage { .. } => JobKind::TextToImage,
            Self::ImageTo3d { .. } => JobKind::ImageTo3d,
        }
    }
}

/// The single artifact produced by a predict call.
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    /// Encoded image bytes (PNG, JPEG, ...).
    Image { bytes: Vec<u8> },
    /// A mesh file written to the requested output path.
    Mesh { path: PathBuf },
}

/// A loaded, ready-to-use model.
///
/// Implementations must tolerate concurrent `predict` calls, serialising
/// them internally if the underlying model cannot run two at once, and
/// must revert any transient mutation before `predict` returns.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Logical model name this handle was loaded for.
    fn model_name(&self) -> &str;

    fn adapter_kind(&self) -> AdapterKind;

    /// Overlay names this handle accepts, sorted.
    fn known_overlays(&self) -> Vec<String> {
        Vec::new()
    }

    async fn predict(&self, input: PredictInput) -> Result<Artifact, AdapterError>;
}

/// Constructs adapter handles for one adapter family.
#[async_trait]
pub trait AdapterLoader: Send + Sync {
    /// Expensive: allocates model memory. Called at most once per cache entry.
    async fn load(&self, config: &ModelConfig) -> Result<Arc<dyn ModelAdapter>, AdapterError>;
}
