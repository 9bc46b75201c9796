//! Per-job pipeline.
//!
//! Every job gets its own scratch directory. The step sequence runs under a
//! watchdog; whatever it returns, the scratch directory is removed before
//! the outcome is reported. A [`tempfile::TempDir`] guard also removes it if
//! the executing task panics or is dropped mid-step.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use atelier_adapters::{Artifact, ModelAdapter, OverlayRequest, PredictInput};
use atelier_core::error::{FailureKind, JobFailure};
use atelier_core::job::{JobDescriptor, JobOutcome, JobOutput};
use atelier_core::params::{ImageTo3dParams, JobParameters, TextToImageParams};
use atelier_core::types::JobId;
use atelier_storage::StorageGateway;
use tempfile::TempDir;
use uuid::Uuid;

use crate::cache::ModelCache;
use crate::error::ExecutionError;

/// Default watchdog for one job (30 minutes).
const DEFAULT_JOB_TIMEOUT_SECS: u64 = 1800;

/// Executor settings.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Parent directory for per-job scratch directories.
    pub scratch_root: PathBuf,
    /// Upper bound on one job's step sequence.
    pub job_timeout: Duration,
}

impl ExecutorConfig {
    /// Load from environment variables with defaults.
    ///
    /// | Env Var            | Default            |
    /// |--------------------|--------------------|
    /// | `SCRATCH_DIR`      | system temp dir    |
    /// | `JOB_TIMEOUT_SECS` | `1800`             |
    pub fn from_env() -> Self {
        let scratch_root = std::env::var("SCRATCH_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("atelier"));

        let job_timeout_secs: u64 = std::env::var("JOB_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_JOB_TIMEOUT_SECS.to_string())
            .parse()
            .expect("JOB_TIMEOUT_SECS must be a valid u64");

        Self {
            scratch_root,
            job_timeout: Duration::from_secs(job_timeout_secs),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            scratch_root: std::env::temp_dir().join("atelier"),
            job_timeout: Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS),
        }
    }
}

/// Runs jobs against the shared cache and storage gateway.
pub struct JobExecutor {
    cache: Arc<ModelCache>,
    storage: Arc<dyn StorageGateway>,
    config: ExecutorConfig,
}

impl JobExecutor {
    pub fn new(
        cache: Arc<ModelCache>,
        storage: Arc<dyn StorageGateway>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            cache,
            storage,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<ModelCache> {
        &self.cache
    }

    /// Run `descriptor` to a terminal outcome. Never panics on step
    /// failure and always removes the job's scratch directory.
    pub async fn execute(&self, descriptor: &JobDescriptor) -> JobOutcome {
        let started = Instant::now();
        let job_id = descriptor.job_id;

        let result = self.run(descriptor).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(output) => {
                tracing::info!(
                    %job_id,
                    model = %descriptor.model_name,
                    artifact = %output.artifact,
                    elapsed_ms,
                    "Job succeeded",
                );
                Ok(output)
            }
            Err(err) => {
                let failure = JobFailure::from(err.into_logged(job_id));
                tracing::warn!(
                    %job_id,
                    model = %descriptor.model_name,
                    kind = %failure.kind,
                    error = %failure.message,
                    elapsed_ms,
                    "Job failed",
                );
                Err(failure)
            }
        }
    }

    async fn run(&self, descriptor: &JobDescriptor) -> Result<JobOutput, ExecutionError> {
        let params = JobParameters::parse(descriptor.kind, &descriptor.parameters)?;
        let scratch = self.create_scratch(descriptor.job_id).await?;

        let steps = async {
            match params {
                JobParameters::TextToImage(p) => self.text_to_image(descriptor, p).await,
                JobParameters::ImageTo3d(p) => {
                    self.image_to_3d(descriptor, p, scratch.path()).await
                }
            }
        };

        let result = match tokio::time::timeout(self.config.job_timeout, steps).await {
            Ok(result) => result,
            Err(_) => Err(ExecutionError::Timeout(self.config.job_timeout)),
        };

        release_scratch(scratch, descriptor.job_id).await;
        result
    }

    // ---- steps ----

    async fn text_to_image(
        &self,
        descriptor: &JobDescriptor,
        params: TextToImageParams,
    ) -> Result<JobOutput, ExecutionError> {
        let adapter = self.resolve(descriptor).await?;

        let overlay = params.overlay_name.clone().map(|name| OverlayRequest {
            name,
            strength: params.overlay_strength,
        });
        let artifact = adapter
            .predict(PredictInput::TextToImage {
                prompt: params.prompt,
                overlay,
            })
            .await?;

        let Artifact::Image { bytes } = artifact else {
            return Err(ExecutionError::Artifact("expected an image".into()));
        };
        let format = image::guess_format(&bytes)
            .map_err(|_| ExecutionError::Artifact("unrecognised image format".into()))?;
        let extension = format.extensions_str().first().copied().unwrap_or("png");

        let key = format!("outputs/images/{}.{extension}", Uuid::new_v4());
        let locator = self.storage.store(bytes, &key).await?;

        Ok(JobOutput {
            artifact: locator,
            source: None,
            overlay_used: params.overlay_name,
        })
    }

    async fn image_to_3d(
        &self,
        descriptor: &JobDescriptor,
        params: ImageTo3dParams,
        scratch: &Path,
    ) -> Result<JobOutput, ExecutionError> {
        let source = params.source();
        let image = self.storage.fetch(&source).await?;

        let extension = source
            .extension()
            .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or_else(|| "png".to_string());
        let image_path = scratch.join(format!("source.{extension}"));
        tokio::fs::write(&image_path, image)
            .await
            .map_err(ExecutionError::Scratch)?;

        let adapter = self.resolve(descriptor).await?;

        let mesh_name = format!("{}.glb", Uuid::new_v4());
        let artifact = adapter
            .predict(PredictInput::ImageTo3d {
                image_path,
                output_path: scratch.join(&mesh_name),
            })
            .await?;

        let Artifact::Mesh { path } = artifact else {
            return Err(ExecutionError::Artifact("expected a mesh file".into()));
        };
        let mesh = tokio::fs::read(&path)
            .await
            .map_err(|e| ExecutionError::Artifact(format!("mesh file unreadable: {e}")))?;

        let locator = self
            .storage
            .store(mesh, &format!("outputs/meshes/{mesh_name}"))
            .await?;

        Ok(JobOutput {
            artifact: locator,
            source: Some(source),
            overlay_used: None,
        })
    }

    /// Catalog compatibility check, then the shared handle.
    async fn resolve(&self, descriptor: &JobDescriptor) -> Result<Arc<dyn ModelAdapter>, ExecutionError> {
        if let Some(config) = self.cache.catalog().get(&descriptor.model_name) {
            let serves = config.adapter.serves();
            if serves != descriptor.kind {
                return Err(ExecutionError::IncompatibleModel {
                    model: config.name.clone(),
                    serves,
                    requested: descriptor.kind,
                });
            }
        }
        Ok(self.cache.get_or_load(&descriptor.model_name).await?)
    }

    // ---- scratch ----

    async fn create_scratch(&self, job_id: JobId) -> Result<TempDir, ExecutionError> {
        tokio::fs::create_dir_all(&self.config.scratch_root)
            .await
            .map_err(ExecutionError::Scratch)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("job-{job_id}-"))
            .tempdir_in(&self.config.scratch_root)
            .map_err(ExecutionError::Scratch)?;
        tracing::debug!(%job_id, scratch = %dir.path().display(), "Scratch directory created");
        Ok(dir)
    }
}

/// Remove a job's scratch directory. Failures are logged only.
async fn release_scratch(scratch: TempDir, job_id: JobId) {
    let path = scratch.path().to_path_buf();
    match tokio::task::spawn_blocking(move || scratch.close()).await {
        Ok(Ok(())) => {
            tracing::debug!(%job_id, scratch = %path.display(), "Scratch directory removed");
        }
        Ok(Err(e)) => {
            tracing::warn!(%job_id, scratch = %path.display(), error = %e, "Failed to remove scratch directory");
        }
        Err(e) => {
            tracing::warn!(%job_id, error = %e, "Scratch cleanup task failed");
        }
    }
}

impl ExecutionError {
    /// Log detail that the sanitised failure message drops.
    fn into_logged(self, job_id: JobId) -> Self {
        if self.failure_kind() == FailureKind::Internal {
            tracing::error!(%job_id, error = %self, "Internal job failure");
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use atelier_adapters::testing::{FakeLoader, GLB_BYTES, PNG_BYTES};
    use atelier_core::job::JobKind;
    use atelier_core::model::{AdapterKind, ModelCatalog, ModelConfig};
    use atelier_storage::MemoryStorage;
    use serde_json::json;

    use super::*;

    struct Fixture {
        executor: JobExecutor,
        storage: Arc<MemoryStorage>,
        loader: Arc<FakeLoader>,
        scratch: TempDir,
    }

    fn fixture_with(loader: FakeLoader, job_timeout: Duration) -> Fixture {
        let catalog = ModelCatalog::new([
            ModelConfig::new("sd", "org/sd", AdapterKind::Diffusion),
            ModelConfig::new("hunyuan", "org/hunyuan", AdapterKind::Mesh),
        ])
        .unwrap();
        let loader = Arc::new(loader);
        let cache = Arc::new(ModelCache::new(Arc::new(catalog), FakeLoader::registry(&loader)));
        let storage = Arc::new(MemoryStorage::new());
        let scratch = tempfile::tempdir().unwrap();
        let executor = JobExecutor::new(
            cache,
            Arc::clone(&storage) as Arc<dyn StorageGateway>,
            ExecutorConfig {
                scratch_root: scratch.path().to_path_buf(),
                job_timeout,
            },
        );
        Fixture {
            executor,
            storage,
            loader,
            scratch,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(FakeLoader::new(), Duration::from_secs(30))
    }

    impl Fixture {
        fn leftover_scratch(&self) -> usize {
            std::fs::read_dir(self.scratch.path()).unwrap().count()
        }
    }

    #[tokio::test]
    async fn text_to_image_stores_png() {
        let fx = fixture();
        let job = JobDescriptor::new(
            JobKind::TextToImage,
            "sd",
            json!({"prompt": "a cat", "overlay_name": "pixel-art"}),
        );

        let output = fx.executor.execute(&job).await.unwrap();

        assert!(output.artifact.as_str().starts_with("mem://outputs/images/"));
        assert!(output.artifact.as_str().ends_with(".png"));
        assert_eq!(output.overlay_used.as_deref(), Some("pixel-art"));
        assert_eq!(fx.storage.fetch(&output.artifact).await.unwrap(), PNG_BYTES);
        assert_eq!(fx.leftover_scratch(), 0);
    }

    #[tokio::test]
    async fn image_to_3d_stores_mesh_and_cleans_up() {
        let fx = fixture();
        let source = fx.storage.insert("inputs/cat.png", PNG_BYTES.to_vec()).await;
        let job = JobDescriptor::new(
            JobKind::ImageTo3d,
            "hunyuan",
            json!({"source_image_locator": source.as_str()}),
        );

        let output = fx.executor.execute(&job).await.unwrap();

        assert!(output.artifact.as_str().starts_with("mem://outputs/meshes/"));
        assert!(output.artifact.as_str().ends_with(".glb"));
        assert_eq!(output.source, Some(source));
        assert_eq!(fx.storage.fetch(&output.artifact).await.unwrap(), GLB_BYTES);
        assert_eq!(fx.leftover_scratch(), 0);
    }

    #[tokio::test]
    async fn fetch_failure_leaves_no_files() {
        let fx = fixture();
        let job = JobDescriptor::new(
            JobKind::ImageTo3d,
            "hunyuan",
            json!({"source_image_locator": "mem://inputs/missing.png"}),
        );

        let failure = fx.executor.execute(&job).await.unwrap_err();

        assert_eq!(failure.kind, FailureKind::Transfer);
        assert_eq!(fx.leftover_scratch(), 0);
        assert!(fx.storage.is_empty().await);
        assert_eq!(fx.loader.load_count(), 0);
    }

    #[tokio::test]
    async fn unknown_model_fails_without_loading() {
        let fx = fixture();
        let job = JobDescriptor::new(JobKind::TextToImage, "nonexistent", json!({"prompt": "a"}));

        let failure = fx.executor.execute(&job).await.unwrap_err();

        assert_eq!(failure.kind, FailureKind::UnknownModel);
        assert!(failure.message.contains("nonexistent"));
        assert_eq!(fx.loader.load_count(), 0);
        assert_eq!(fx.leftover_scratch(), 0);
    }

    #[tokio::test]
    async fn unknown_overlay_lists_known() {
        let fx = fixture();
        let job = JobDescriptor::new(
            JobKind::TextToImage,
            "sd",
            json!({"prompt": "a cat", "overlay_name": "nonexistent"}),
        );

        let failure = fx.executor.execute(&job).await.unwrap_err();

        assert_eq!(failure.kind, FailureKind::UnknownOverlay);
        assert!(failure.message.contains("pixel-art, watercolor"));
        assert!(fx.storage.is_empty().await);
    }

    #[tokio::test]
    async fn incompatible_model_is_rejected() {
        let fx = fixture();
        let job = JobDescriptor::new(JobKind::TextToImage, "hunyuan", json!({"prompt": "a"}));

        let failure = fx.executor.execute(&job).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::IncompatibleModel);
        assert_eq!(fx.loader.load_count(), 0);
    }

    #[tokio::test]
    async fn invalid_parameters_fail_before_any_io() {
        let fx = fixture();
        let job = JobDescriptor::new(JobKind::ImageTo3d, "hunyuan", json!({"prompt": "a"}));

        let failure = fx.executor.execute(&job).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::InvalidParameters);
        assert_eq!(fx.leftover_scratch(), 0);
    }

    #[tokio::test]
    async fn load_failure_is_reported() {
        let loader = FakeLoader::new();
        loader.fail_next_loads(1);
        let fx = fixture_with(loader, Duration::from_secs(30));
        let job = JobDescriptor::new(JobKind::TextToImage, "sd", json!({"prompt": "a"}));

        let failure = fx.executor.execute(&job).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::ModelLoad);

        fx.executor.execute(&job).await.unwrap();
        assert_eq!(fx.loader.load_count(), 2);
    }

    #[tokio::test]
    async fn watchdog_times_out_and_cleans_up() {
        let fx = fixture_with(
            FakeLoader::new().with_predict_delay(Duration::from_secs(5)),
            Duration::from_millis(50),
        );
        let source = fx.storage.insert("inputs/cat.png", PNG_BYTES.to_vec()).await;
        let job = JobDescriptor::new(
            JobKind::ImageTo3d,
            "hunyuan",
            json!({"source_image_locator": source.as_str()}),
        );

        let failure = fx.executor.execute(&job).await.unwrap_err();

        assert_matches!(failure.kind, FailureKind::Timeout);
        assert_eq!(fx.leftover_scratch(), 0);
        assert_eq!(fx.storage.len().await, 1);
    }
}
