//! Typed, validated job parameters.
//!
//! The broker stores parameters as opaque JSON. The HTTP layer and the
//! pipeline executor both call [`JobParameters::parse`] so that malformed
//! submissions are rejected early and, if one slips through, fail the job
//! with `InvalidParameters` instead of reaching an adapter.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::job::JobKind;
use crate::locator::Locator;

/// Parameters of a text-to-image job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct TextToImageParams {
    #[validate(length(min = 1, max = 4000))]
    pub prompt: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 256))]
    pub overlay_name: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0))]
    pub overlay_strength: Option<f64>,
}

/// Parameters of an image-to-3d job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ImageTo3dParams {
    #[validate(length(min = 1))]
    pub source_image_locator: String,
}

impl ImageTo3dParams {
    pub fn source(&self) -> Locator {
        Locator::new(self.source_image_locator.clone())
    }
}

/// Parameters resolved against a job kind.
#[derive(Debug, Clone, PartialEq)]
pub enum JobParameters {
    TextToImage(TextToImageParams),
    ImageTo3d(ImageTo3dParams),
}

impl JobParameters {
    /// Deserialize and validate `value` as the parameter set of `kind`.
    pub fn parse(kind: JobKind, value: &serde_json::Value) -> Result<Self, CoreError> {
        match kind {
            JobKind::TextToImage => {
                let params: TextToImageParams = decode(kind, value)?;
                check(&params)?;
                if params.prompt.trim().is_empty() {
                    return Err(CoreError::Validation(
                        "prompt must not be blank".to_string(),
                    ));
                }
                if params.overlay_strength.is_some() && params.overlay_name.is_none() {
                    return Err(CoreError::Validation(
                        "overlay_strength requires overlay_name".to_string(),
                    ));
                }
                Ok(Self::TextToImage(params))
            }
            JobKind::ImageTo3d => {
                let params: ImageTo3dParams = decode(kind, value)?;
                check(&params)?;
                Ok(Self::ImageTo3d(params))
            }
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    kind: JobKind,
    value: &serde_json::Value,
) -> Result<T, CoreError> {
    serde_json::from_value(value.clone())
        .map_err(|e| CoreError::Validation(format!("invalid {kind} parameters: {e}")))
}

fn check<T: Validate>(params: &T) -> Result<(), CoreError> {
    params
        .validate()
        .map_err(|e| CoreError::Validation(e.to_string().replace('\n', "; ")))
}
