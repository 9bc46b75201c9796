//! Model catalog: the startup mapping from logical model name to the
//! adapter family and backing weights that serve it.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::job::JobKind;

/// Default strength applied when a job names an overlay but no strength.
pub const DEFAULT_OVERLAY_STRENGTH: f64 = 0.8;

/// Default denoising steps for mesh reconstruction (turbo checkpoint).
pub const DEFAULT_MESH_INFERENCE_STEPS: u32 = 5;

/// Adapter families known to this build.
///
/// Deserialising an unknown identifier fails, so a catalog naming an
/// adapter we cannot construct is rejected when it is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    /// 2D diffusion (text-to-image) with optional transient overlays.
    Diffusion,
    /// Single-image 3D reconstruction producing a mesh file.
    Mesh,
}

impl AdapterKind {
    /// The job kind this adapter family serves.
    pub fn serves(self) -> JobKind {
        match self {
            Self::Diffusion => JobKind::TextToImage,
            Self::Mesh => JobKind::ImageTo3d,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Diffusion => "diffusion",
            Self::Mesh => "mesh",
        }
    }
}

impl std::fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration of one logical model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    pub backing_model_id: String,
    pub adapter: AdapterKind,
    #[serde(default)]
    pub adapter_options: serde_json::Map<String, serde_json::Value>,
}

impl ModelConfig {
    pub fn new(
        name: impl Into<String>,
        backing_model_id: impl Into<String>,
        adapter: AdapterKind,
    ) -> Self {
        Self {
            name: name.into(),
            backing_model_id: backing_model_id.into(),
            adapter,
            adapter_options: serde_json::Map::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.adapter_options.insert(key.into(), value);
        self
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.adapter_options.get(key).and_then(|v| v.as_str())
    }

    pub fn option_f64(&self, key: &str) -> Option<f64> {
        self.adapter_options.get(key).and_then(|v| v.as_f64())
    }

    pub fn option_u64(&self, key: &str) -> Option<u64> {
        self.adapter_options.get(key).and_then(|v| v.as_u64())
    }
}

/// Catalog file layout: `{"models": [ModelConfig, ...]}`.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    models: Vec<ModelConfig>,
}

/// Immutable `name -> ModelConfig` mapping available from process start.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    models: BTreeMap<String, ModelConfig>,
}

impl ModelCatalog {
    /// Build a catalog, rejecting duplicate or empty names and invalid options.
    pub fn new(models: impl IntoIterator<Item = ModelConfig>) -> Result<Self, CoreError> {
        let mut map = BTreeMap::new();
        for model in models {
            validate_model(&model)?;
            if map.contains_key(&model.name) {
                return Err(CoreError::Config(format!(
                    "Model '{}' is defined more than once",
                    model.name
                )));
            }
            map.insert(model.name.clone(), model);
        }
        Ok(Self { models: map })
    }

    /// Parse a catalog from JSON text.
    pub fn from_json(text: &str) -> Result<Self, CoreError> {
        let file: CatalogFile = serde_json::from_str(text)
            .map_err(|e| CoreError::Config(format!("Invalid model catalog: {e}")))?;
        Self::new(file.models)
    }

    /// Read and parse a catalog file.
    pub fn from_json_file(path: &Path) -> Result<Self, CoreError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Config(format!(
                "Cannot read model catalog {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&text)
    }

    /// The catalog used when no file is configured.
    pub fn builtin() -> Self {
        let models = [
            ModelConfig::new(
                "stable-diffusion-v1-5",
                "runwayml/stable-diffusion-v1-5",
                AdapterKind::Diffusion,
            )
            .with_option(
                "default_overlay_strength",
                serde_json::json!(DEFAULT_OVERLAY_STRENGTH),
            )
            .with_option("overlay_dir", serde_json::json!("overlays")),
            ModelConfig::new("hunyuan3d-v1", "tencent/Hunyuan3D-2", AdapterKind::Mesh)
                .with_option("subfolder", serde_json::json!("hunyuan3d-dit-v2-0-turbo"))
                .with_option(
                    "num_inference_steps",
                    serde_json::json!(DEFAULT_MESH_INFERENCE_STEPS),
                ),
        ];
        let models = models.into_iter().map(|m| (m.name.clone(), m)).collect();
        Self { models }
    }

    pub fn get(&self, name: &str) -> Option<&ModelConfig> {
        self.models.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelConfig> {
        self.models.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

fn validate_model(model: &ModelConfig) -> Result<(), CoreError> {
    if model.name.trim().is_empty() {
        return Err(CoreError::Config("Model name must not be empty".into()));
    }
    if model.backing_model_id.trim().is_empty() {
        return Err(CoreError::Config(format!(
            "Model '{}' has an empty backing_model_id",
            model.name
        )));
    }
    if let Some(value) = model.adapter_options.get("default_overlay_strength") {
        match value.as_f64() {
            Some(s) if (0.0..=1.0).contains(&s) => {}
            _ => {
                return Err(CoreError::Config(format!(
                    "Model '{}': default_overlay_strength must be a number in [0, 1]",
                    model.name
                )))
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn builtin_catalog_has_both_families() {
        let catalog = ModelCatalog::builtin();
        assert_eq!(catalog.len(), 2);
        let sd = catalog.get("stable-diffusion-v1-5").unwrap();
        assert_eq!(sd.adapter, AdapterKind::Diffusion);
        assert_eq!(sd.option_f64("default_overlay_strength"), Some(0.8));
        let mesh = catalog.get("hunyuan3d-v1").unwrap();
        assert_eq!(mesh.adapter.serves(), JobKind::ImageTo3d);
        assert_eq!(mesh.option_u64("num_inference_steps"), Some(5));
    }

    #[test]
    fn parses_catalog_json() {
        let catalog = ModelCatalog::from_json(
            r#"{"models": [
                {"name": "m1", "backing_model_id": "org/m1", "adapter": "diffusion",
                 "adapter_options": {"endpoint": "http://gpu-1:7860"}}
            ]}"#,
        )
        .unwrap();
        let m1 = catalog.get("m1").unwrap();
        assert_eq!(m1.option_str("endpoint"), Some("http://gpu-1:7860"));
        assert!(!catalog.contains("m2"));
    }

    #[test]
    fn unknown_adapter_is_rejected_at_parse_time() {
        let err = ModelCatalog::from_json(
            r#"{"models": [{"name": "m1", "backing_model_id": "x", "adapter": "core.adapters.Foo"}]}"#,
        )
        .unwrap_err();
        assert_matches!(err, CoreError::Config(msg) if msg.contains("unknown variant"));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = ModelCatalog::new([
            ModelConfig::new("m", "a", AdapterKind::Diffusion),
            ModelConfig::new("m", "b", AdapterKind::Mesh),
        ])
        .unwrap_err();
        assert_matches!(err, CoreError::Config(msg) if msg.contains("more than once"));
    }

    #[test]
    fn out_of_range_default_strength_is_rejected() {
        let err = ModelCatalog::new([ModelConfig::new("m", "a", AdapterKind::Diffusion)
            .with_option("default_overlay_strength", serde_json::json!(3.0))])
        .unwrap_err();
        assert_matches!(err, CoreError::Config(_));
    }

    #[test]
    fn reads_catalog_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.json");
        std::fs::write(
            &path,
            r#"{"models": [{"name": "mesh", "backing_model_id": "t/h", "adapter": "mesh"}]}"#,
        )
        .unwrap();
        let catalog = ModelCatalog::from_json_file(&path).unwrap();
        assert!(catalog.contains("mesh"));

        let missing = ModelCatalog::from_json_file(&dir.path().join("nope.json"));
        assert_matches!(missing, Err(CoreError::Config(_)));
    }
}
