//! REST client for the model-server sidecar.
//!
//! The sidecar owns GPU memory and runs the actual inference. Each loaded
//! model is a server-side session; overlays are applied to and removed
//! from a session explicitly.

use std::time::Duration;

use atelier_core::model::ModelConfig;
use serde::{Deserialize, Serialize};

/// Default sidecar address when neither the model nor the process
/// configures one.
pub const DEFAULT_INFERENCE_URL: &str = "http://localhost:7860";

/// Connect timeout for sidecar requests. Requests themselves are not
/// bounded here; the executor watchdog bounds whole jobs.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Process-wide sidecar settings.
#[derive(Debug, Clone)]
pub struct ModelServerConfig {
    /// Used for models whose options do not set `endpoint`.
    pub default_endpoint: String,
}

impl ModelServerConfig {
    /// Load from `INFERENCE_URL` (default `http://localhost:7860`).
    pub fn from_env() -> Self {
        Self {
            default_endpoint: std::env::var("INFERENCE_URL")
                .unwrap_or_else(|_| DEFAULT_INFERENCE_URL.into()),
        }
    }

    /// Shared HTTP client for every session against any sidecar.
    pub fn http_client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            })
    }

    /// Endpoint for `config`: its `endpoint` option, else the default.
    pub fn endpoint_for<'a>(&'a self, config: &'a ModelConfig) -> &'a str {
        config
            .option_str("endpoint")
            .unwrap_or(&self.default_endpoint)
    }
}

impl Default for ModelServerConfig {
    fn default() -> Self {
        Self {
            default_endpoint: DEFAULT_INFERENCE_URL.into(),
        }
    }
}

/// Adapter options forwarded to the sidecar on load, minus the keys in
/// `local` that only this process interprets.
pub fn forwarded_options(
    config: &ModelConfig,
    local: &[&str],
) -> serde_json::Map<String, serde_json::Value> {
    config
        .adapter_options
        .iter()
        .filter(|(key, _)| key.as_str() != "endpoint" && !local.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Response of `POST /models/load`.
#[derive(Debug, Deserialize)]
pub struct LoadResponse {
    pub session_id: String,
}

#[derive(Serialize)]
struct LoadRequest<'a> {
    model_id: &'a str,
    options: &'a serde_json::Map<String, serde_json::Value>,
}

#[derive(Serialize)]
struct OverlayBody<'a> {
    path: &'a str,
    strength: f64,
}

#[derive(Serialize)]
struct GenerateBody<'a> {
    prompt: &'a str,
}

/// Errors from the model-server REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ModelServerError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The sidecar returned a non-2xx status code.
    #[error("Model server error ({status}): {body}")]
    Api { status: u16, body: String },
}

/// HTTP client for one sidecar endpoint.
#[derive(Clone)]
pub struct ModelServerApi {
    client: reqwest::Client,
    base_url: String,
}

impl ModelServerApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Reuse an existing [`reqwest::Client`] for connection pooling.
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /models/load` -- bring a model into sidecar memory.
    pub async fn load_model(
        &self,
        model_id: &str,
        options: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<LoadResponse, ModelServerError> {
        let response = self
            .client
            .post(format!("{}/models/load", self.base_url))
            .json(&LoadRequest { model_id, options })
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// `POST /sessions/{id}/overlay` -- apply an overlay to a session.
    pub async fn apply_overlay(
        &self,
        session_id: &str,
        path: &str,
        strength: f64,
    ) -> Result<(), ModelServerError> {
        let response = self
            .client
            .post(format!("{}/sessions/{session_id}/overlay", self.base_url))
            .json(&OverlayBody { path, strength })
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// `DELETE /sessions/{id}/overlay` -- revert the session to base weights.
    pub async fn remove_overlay(&self, session_id: &str) -> Result<(), ModelServerError> {
        let response = self
            .client
            .delete(format!("{}/sessions/{session_id}/overlay", self.base_url))
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// `POST /sessions/{id}/generate` -- text-to-image; returns encoded image bytes.
    pub async fn generate(&self, session_id: &str, prompt: &str) -> Result<Vec<u8>, ModelServerError> {
        let response = self
            .client
            .post(format!("{}/sessions/{session_id}/generate", self.base_url))
            .json(&GenerateBody { prompt })
            .send()
            .await?;

        Self::read_bytes(response).await
    }

    /// `POST /sessions/{id}/reconstruct` -- image-to-3d; returns mesh bytes.
    pub async fn reconstruct(
        &self,
        session_id: &str,
        image: Vec<u8>,
        num_inference_steps: u32,
        subfolder: Option<&str>,
    ) -> Result<Vec<u8>, ModelServerError> {
        let mut query = vec![("num_inference_steps", num_inference_steps.to_string())];
        if let Some(subfolder) = subfolder {
            query.push(("subfolder", subfolder.to_string()));
        }

        let response = self
            .client
            .post(format!("{}/sessions/{session_id}/reconstruct", self.base_url))
            .query(&query)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image)
            .send()
            .await?;

        Self::read_bytes(response).await
    }

    // ---- private helpers ----

    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ModelServerError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ModelServerError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ModelServerError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn read_bytes(response: reqwest::Response) -> Result<Vec<u8>, ModelServerError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn check_status(response: reqwest::Response) -> Result<(), ModelServerError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}
