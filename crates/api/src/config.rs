use std::path::PathBuf;

use atelier_broker::queue::DEFAULT_QUEUE_CAPACITY;
use atelier_core::error::CoreError;
use atelier_core::job::JobKind;
use atelier_core::model::ModelCatalog;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for in-flight jobs (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Catalog file; `None` uses the built-in catalog.
    pub catalog_path: Option<PathBuf>,
    /// Model used by text-to-image submissions that name none.
    pub default_text_to_image_model: String,
    /// Model used by image-to-3d submissions that name none.
    pub default_image_to_3d_model: String,
    /// Buffered submissions before `POST /jobs` answers 503.
    pub queue_capacity: usize,
    /// Terminal job records older than this are purged (default: `24`).
    pub retention_hours: i64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default                   |
    /// |-------------------------------|---------------------------|
    /// | `HOST`                        | `0.0.0.0`                 |
    /// | `PORT`                        | `8000`                    |
    /// | `CORS_ORIGINS`                | `http://localhost:5173`   |
    /// | `REQUEST_TIMEOUT_SECS`        | `30`                      |
    /// | `SHUTDOWN_TIMEOUT_SECS`       | `30`                      |
    /// | `MODEL_CATALOG_PATH`          | unset (built-in catalog)  |
    /// | `DEFAULT_TEXT_TO_IMAGE_MODEL` | `stable-diffusion-v1-5`   |
    /// | `DEFAULT_IMAGE_TO_3D_MODEL`   | `hunyuan3d-v1`            |
    /// | `JOB_QUEUE_CAPACITY`          | `1024`                    |
    /// | `JOB_RETENTION_HOURS`         | `24`                      |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let catalog_path = std::env::var("MODEL_CATALOG_PATH").ok().map(PathBuf::from);

        let default_text_to_image_model = std::env::var("DEFAULT_TEXT_TO_IMAGE_MODEL")
            .unwrap_or_else(|_| "stable-diffusion-v1-5".into());
        let default_image_to_3d_model =
            std::env::var("DEFAULT_IMAGE_TO_3D_MODEL").unwrap_or_else(|_| "hunyuan3d-v1".into());

        let queue_capacity: usize = std::env::var("JOB_QUEUE_CAPACITY")
            .unwrap_or_else(|_| DEFAULT_QUEUE_CAPACITY.to_string())
            .parse()
            .expect("JOB_QUEUE_CAPACITY must be a valid usize");
        assert!(queue_capacity > 0, "JOB_QUEUE_CAPACITY must be at least 1");

        let retention_hours: i64 = std::env::var("JOB_RETENTION_HOURS")
            .unwrap_or_else(|_| "24".into())
            .parse()
            .expect("JOB_RETENTION_HOURS must be a valid i64");
        assert!(
            chrono::Duration::try_hours(retention_hours).is_some(),
            "JOB_RETENTION_HOURS is out of range"
        );

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            catalog_path,
            default_text_to_image_model,
            default_image_to_3d_model,
            queue_capacity,
            retention_hours,
        }
    }

    /// Model name used when a submission omits one.
    pub fn default_model(&self, kind: JobKind) -> &str {
        match kind {
            JobKind::TextToImage => &self.default_text_to_image_model,
            JobKind::ImageTo3d => &self.default_image_to_3d_model,
        }
    }

    /// The configured catalog file, or the built-in catalog.
    pub fn load_catalog(&self) -> Result<ModelCatalog, CoreError> {
        match &self.catalog_path {
            Some(path) => ModelCatalog::from_json_file(path),
            None => Ok(ModelCatalog::builtin()),
        }
    }
}
