//! Process-wide model cache.
//!
//! Each catalog model moves through `ABSENT -> LOADING -> READY | FAILED`.
//! Concurrent requests for a model that is loading join the in-flight load
//! and all observe its single outcome. A failed load is not cached: the
//! next request after the failure starts a fresh attempt.
//!
//! Loads run on their own task so that a caller giving up (job timeout,
//! cancellation) never aborts a load other callers are waiting on.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use atelier_adapters::{AdapterRegistry, ModelAdapter};
use atelier_core::model::{ModelCatalog, ModelConfig};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tokio::sync::Mutex;

/// Errors from [`ModelCache::get_or_load`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Model '{model}' failed to load: {cause}")]
    ModelLoad { model: String, cause: String },
}

/// Observable load state of one catalog model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadState {
    Absent,
    Loading,
    Ready,
    Failed,
}

type LoadResult = Result<Arc<dyn ModelAdapter>, CacheError>;
type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;

enum Slot {
    Loading(SharedLoad),
    Ready(Arc<dyn ModelAdapter>),
    Failed,
}

type Slots = Arc<Mutex<HashMap<String, Slot>>>;

/// Shared by every executor in the process as `Arc<ModelCache>`.
pub struct ModelCache {
    catalog: Arc<ModelCatalog>,
    registry: AdapterRegistry,
    slots: Slots,
}

impl ModelCache {
    pub fn new(catalog: Arc<ModelCatalog>, registry: AdapterRegistry) -> Self {
        Self {
            catalog,
            registry,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Return the handle for `name`, loading it if this is the first use.
    pub async fn get_or_load(&self, name: &str) -> LoadResult {
        let config = self
            .catalog
            .get(name)
            .ok_or_else(|| CacheError::UnknownModel(name.to_string()))?;

        let pending = {
            let mut slots = self.slots.lock().await;
            match slots.get(name) {
                Some(Slot::Ready(handle)) => return Ok(Arc::clone(handle)),
                Some(Slot::Loading(load)) => {
                    tracing::debug!(model = %name, "Joining in-flight model load");
                    load.clone()
                }
                Some(Slot::Failed) | None => {
                    let load = self.start_load(config.clone());
                    slots.insert(name.to_string(), Slot::Loading(load.clone()));
                    load
                }
            }
        };

        pending.await
    }

    /// Current state of `name`. Names outside the catalog report `Absent`.
    pub async fn state(&self, name: &str) -> LoadState {
        match self.slots.lock().await.get(name) {
            None => LoadState::Absent,
            Some(Slot::Loading(_)) => LoadState::Loading,
            Some(Slot::Ready(_)) => LoadState::Ready,
            Some(Slot::Failed) => LoadState::Failed,
        }
    }

    /// Names of READY models, sorted.
    pub async fn loaded_models(&self) -> Vec<String> {
        let slots = self.slots.lock().await;
        let mut names: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Ready(_)))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Drop a READY handle so the next use reloads it.
    ///
    /// Returns `false` if the model was not READY; in-flight loads are
    /// never interrupted. Jobs already holding the handle keep using it.
    pub async fn evict(&self, name: &str) -> bool {
        let mut slots = self.slots.lock().await;
        if matches!(slots.get(name), Some(Slot::Ready(_))) {
            slots.remove(name);
            tracing::info!(model = %name, "Model evicted");
            true
        } else {
            false
        }
    }

    fn start_load(&self, config: ModelConfig) -> SharedLoad {
        let registry = self.registry.clone();
        let slots = Arc::clone(&self.slots);
        let name = config.name.clone();

        let task = tokio::spawn({
            let slots = Arc::clone(&slots);
            async move {
                let started = Instant::now();
                tracing::info!(model = %config.name, adapter = %config.adapter, "Loading model");

                // A panicking loader still records FAILED, even with no caller left to observe it.
                let result = AssertUnwindSafe(registry.load(&config)).catch_unwind().await;

                let mut slots = slots.lock().await;
                match result {
                    Ok(Ok(handle)) => {
                        slots.insert(config.name.clone(), Slot::Ready(Arc::clone(&handle)));
                        tracing::info!(
                            model = %config.name,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "Model ready",
                        );
                        Ok(handle)
                    }
                    Ok(Err(e)) => {
                        slots.insert(config.name.clone(), Slot::Failed);
                        tracing::error!(model = %config.name, error = %e, "Model load failed");
                        Err(CacheError::ModelLoad {
                            model: config.name,
                            cause: e.to_string(),
                        })
                    }
                    Err(_) => {
                        slots.insert(config.name.clone(), Slot::Failed);
                        tracing::error!(model = %config.name, "Model loader panicked");
                        Err(CacheError::ModelLoad {
                            model: config.name,
                            cause: "loader panicked".to_string(),
                        })
                    }
                }
            }
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    // The load task was aborted (runtime shutdown) before recording an outcome.
                    slots.lock().await.insert(name.clone(), Slot::Failed);
                    tracing::error!(model = %name, error = %e, "Model load task aborted");
                    Err(CacheError::ModelLoad {
                        model: name,
                        cause: "load task aborted".to_string(),
                    })
                }
            }
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use atelier_adapters::testing::FakeLoader;
    use atelier_adapters::{AdapterError, AdapterLoader};
    use atelier_core::model::AdapterKind;

    use super::*;

    fn catalog() -> Arc<ModelCatalog> {
        Arc::new(
            ModelCatalog::new([
                ModelConfig::new("sd", "org/sd", AdapterKind::Diffusion),
                ModelConfig::new("mesh", "org/mesh", AdapterKind::Mesh),
            ])
            .unwrap(),
        )
    }

    fn cache(loader: &Arc<FakeLoader>) -> Arc<ModelCache> {
        Arc::new(ModelCache::new(catalog(), FakeLoader::registry(loader)))
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_load() {
        let loader = Arc::new(FakeLoader::new().with_load_delay(Duration::from_millis(50)));
        let cache = cache(&loader);

        let calls = (0..8).map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get_or_load("sd").await })
        });
        let handles: Vec<_> = futures::future::join_all(calls)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        assert_eq!(loader.load_count(), 1);
        for handle in &handles[1..] {
            assert!(Arc::ptr_eq(&handles[0], handle));
        }
        assert_eq!(cache.state("sd").await, LoadState::Ready);
    }

    #[tokio::test]
    async fn distinct_models_load_in_parallel() {
        let delay = Duration::from_millis(200);
        let loader = Arc::new(FakeLoader::new().with_load_delay(delay));
        let cache = cache(&loader);

        let started = Instant::now();
        let (a, b) = tokio::join!(cache.get_or_load("sd"), cache.get_or_load("mesh"));
        a.unwrap();
        b.unwrap();

        assert_eq!(loader.load_count(), 2);
        assert!(started.elapsed() < delay * 2, "loads ran sequentially");
        assert_eq!(cache.loaded_models().await, ["mesh", "sd"]);
    }

    #[tokio::test]
    async fn ready_handle_is_reused() {
        let loader = Arc::new(FakeLoader::new());
        let cache = cache(&loader);

        let first = cache.get_or_load("sd").await.unwrap();
        let second = cache.get_or_load("sd").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.load_count(), 1);
    }

    #[tokio::test]
    async fn unknown_model_never_loads() {
        let loader = Arc::new(FakeLoader::new());
        let cache = cache(&loader);

        let err = cache.get_or_load("nonexistent").await.err().unwrap();
        assert_matches!(err, CacheError::UnknownModel(name) if name == "nonexistent");
        assert_eq!(loader.load_count(), 0);
        assert_eq!(cache.state("nonexistent").await, LoadState::Absent);
    }

    #[tokio::test]
    async fn joined_callers_see_failure_then_next_call_retries() {
        let loader = Arc::new(FakeLoader::new().with_load_delay(Duration::from_millis(30)));
        loader.fail_next_loads(1);
        let cache = cache(&loader);

        let (a, b) = tokio::join!(cache.get_or_load("sd"), cache.get_or_load("sd"));
        assert_matches!(a.err().unwrap(), CacheError::ModelLoad { model, .. } if model == "sd");
        assert_matches!(b.err().unwrap(), CacheError::ModelLoad { .. });
        assert_eq!(loader.load_count(), 1);
        assert_eq!(cache.state("sd").await, LoadState::Failed);

        cache.get_or_load("sd").await.unwrap();
        assert_eq!(loader.load_count(), 2);
        assert_eq!(cache.state("sd").await, LoadState::Ready);
    }

    #[tokio::test]
    async fn load_survives_caller_cancellation() {
        let loader = Arc::new(FakeLoader::new().with_load_delay(Duration::from_millis(100)));
        let cache = cache(&loader);

        let gave_up =
            tokio::time::timeout(Duration::from_millis(10), cache.get_or_load("sd")).await;
        assert!(gave_up.is_err());
        assert_eq!(cache.state("sd").await, LoadState::Loading);

        cache.get_or_load("sd").await.unwrap();
        assert_eq!(loader.load_count(), 1);
    }

    struct PanickingLoader;

    #[async_trait::async_trait]
    impl AdapterLoader for PanickingLoader {
        async fn load(&self, _config: &ModelConfig) -> Result<Arc<dyn ModelAdapter>, AdapterError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            panic!("loader blew up");
        }
    }

    #[tokio::test]
    async fn panicking_load_is_recorded_failed_without_waiters() {
        let mut registry = AdapterRegistry::new();
        registry.register(AdapterKind::Diffusion, Arc::new(PanickingLoader));
        let cache = ModelCache::new(catalog(), registry);

        // Nobody is awaiting the load when the loader panics.
        let gave_up =
            tokio::time::timeout(Duration::from_millis(10), cache.get_or_load("sd")).await;
        assert!(gave_up.is_err());

        tokio::time::timeout(Duration::from_secs(5), async {
            while cache.state("sd").await != LoadState::Failed {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("panicked load stayed LOADING");

        let err = cache.get_or_load("sd").await.err().unwrap();
        assert_matches!(err, CacheError::ModelLoad { model, .. } if model == "sd");
    }

    #[tokio::test]
    async fn evict_forces_reload() {
        let loader = Arc::new(FakeLoader::new());
        let cache = cache(&loader);

        assert!(!cache.evict("sd").await);
        cache.get_or_load("sd").await.unwrap();
        assert!(cache.evict("sd").await);
        assert_eq!(cache.state("sd").await, LoadState::Absent);
        assert!(cache.loaded_models().await.is_empty());

        cache.get_or_load("sd").await.unwrap();
        assert_eq!(loader.load_count(), 2);
    }
}
