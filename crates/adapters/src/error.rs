use atelier_core::job::JobKind;
use atelier_core::model::AdapterKind;

use crate::client::ModelServerError;

/// Errors raised by adapter loaders and adapter handles.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The job asked for an overlay the loaded adapter does not know.
    #[error("Unknown overlay '{requested}'. Known overlays: {}", format_known(.known))]
    UnknownOverlay {
        requested: String,
        known: Vec<String>,
    },

    /// The model could not be brought up.
    #[error("Model load failed: {0}")]
    Load(String),

    /// The inputs are malformed for this adapter (missing file, bad range).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The model failed while running inference.
    #[error("Inference failed: {0}")]
    Inference(String),

    /// The adapter family does not serve this kind of input.
    #[error("Adapter '{adapter}' cannot run {kind} jobs")]
    Unsupported { adapter: AdapterKind, kind: JobKind },

    /// No loader is registered for the adapter family.
    #[error("No loader registered for adapter '{0}'")]
    NoLoader(AdapterKind),

    /// The model server rejected or failed a request.
    #[error(transparent)]
    ModelServer(#[from] ModelServerError),
}

fn format_known(known: &[String]) -> String {
    if known.is_empty() {
        "(none)".to_string()
    } else {
        known.join(", ")
    }
}
