use std::collections::HashMap;
use std::sync::Arc;

use atelier_core::error::CoreError;
use atelier_core::model::{AdapterKind, ModelCatalog, ModelConfig};

use crate::adapter::{AdapterLoader, ModelAdapter};
use crate::client::ModelServerConfig;
use crate::diffusion::DiffusionLoader;
use crate::error::AdapterError;
use crate::mesh::MeshLoader;

/// Maps adapter families to the loader that constructs them.
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    loaders: HashMap<AdapterKind, Arc<dyn AdapterLoader>>,
}

impl AdapterRegistry {
    /// An empty registry. Tests register fakes into this.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the sidecar-backed loaders for every shipped family.
    pub fn with_defaults(server: &ModelServerConfig) -> Self {
        let mut registry = Self::new();
        registry.register(AdapterKind::Diffusion, Arc::new(DiffusionLoader::new(server.clone())));
        registry.register(AdapterKind::Mesh, Arc::new(MeshLoader::new(server.clone())));
        registry
    }

    /// Replace the loader for `kind`.
    pub fn register(&mut self, kind: AdapterKind, loader: Arc<dyn AdapterLoader>) {
        self.loaders.insert(kind, loader);
    }

    pub fn loader(&self, kind: AdapterKind) -> Option<&Arc<dyn AdapterLoader>> {
        self.loaders.get(&kind)
    }

    /// Fail at startup if the catalog names a family with no loader.
    pub fn validate_catalog(&self, catalog: &ModelCatalog) -> Result<(), CoreError> {
        for model in catalog.iter() {
            if !self.loaders.contains_key(&model.adapter) {
                return Err(CoreError::Config(format!(
                    "model '{}' uses adapter '{}' but no loader is registered for it",
                    model.name, model.adapter
                )));
            }
        }
        Ok(())
    }

    /// Construct a handle for `config` with its family's loader.
    pub async fn load(&self, config: &ModelConfig) -> Result<Arc<dyn ModelAdapter>, AdapterError> {
        let loader = self
            .loader(config.adapter)
            .ok_or(AdapterError::NoLoader(config.adapter))?;
        loader.load(config).await
    }
}
