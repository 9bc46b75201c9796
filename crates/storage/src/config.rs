use std::path::PathBuf;
use std::sync::Arc;

use crate::error::TransferError;
use crate::gateway::StorageGateway;
use crate::local::LocalStorage;
use crate::memory::MemoryStorage;
use crate::s3::{S3Config, S3Storage};

/// Which backend the process talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    S3,
    Local,
    Memory,
}

impl StorageBackend {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "s3" => Some(Self::S3),
            "local" => Some(Self::Local),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

/// Storage configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub local_root: PathBuf,
    pub s3: S3Config,
}

impl StorageConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default      |
    /// |--------------------------|--------------|
    /// | `STORAGE_BACKEND`        | `local`      |
    /// | `LOCAL_STORAGE_ROOT`     | `./storage`  |
    /// | `S3_REGION`              | `us-east-1`  |
    /// | `S3_BUCKET_NAME`         | `artifacts`  |
    /// | `S3_ENDPOINT_URL`        | unset        |
    /// | `S3_PUBLIC_ENDPOINT_URL` | unset        |
    pub fn from_env() -> Self {
        let backend_name = std::env::var("STORAGE_BACKEND").unwrap_or_else(|_| "local".into());
        let backend = StorageBackend::from_name(&backend_name)
            .unwrap_or_else(|| panic!("STORAGE_BACKEND must be one of s3, local, memory (got '{backend_name}')"));

        let local_root = std::env::var("LOCAL_STORAGE_ROOT")
            .unwrap_or_else(|_| "./storage".into())
            .into();

        let mut s3 = S3Config::new(
            std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into()),
            std::env::var("S3_BUCKET_NAME").unwrap_or_else(|_| "artifacts".into()),
        );
        if let Ok(endpoint) = std::env::var("S3_ENDPOINT_URL") {
            s3 = s3.with_endpoint(endpoint);
        }
        if let Ok(public) = std::env::var("S3_PUBLIC_ENDPOINT_URL") {
            s3 = s3.with_public_endpoint(public);
        }

        Self {
            backend,
            local_root,
            s3,
        }
    }

    /// Construct the configured gateway.
    pub async fn build(&self) -> Result<Arc<dyn StorageGateway>, TransferError> {
        let gateway: Arc<dyn StorageGateway> = match self.backend {
            StorageBackend::S3 => Arc::new(S3Storage::new(self.s3.clone()).await),
            StorageBackend::Local => Arc::new(LocalStorage::new(&self.local_root)?),
            StorageBackend::Memory => Arc::new(MemoryStorage::new()),
        };
        Ok(gateway)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names() {
        assert_eq!(StorageBackend::from_name("S3"), Some(StorageBackend::S3));
        assert_eq!(StorageBackend::from_name(" local "), Some(StorageBackend::Local));
        assert_eq!(StorageBackend::from_name("memory"), Some(StorageBackend::Memory));
        assert_eq!(StorageBackend::from_name("nfs"), None);
    }

    #[tokio::test]
    async fn builds_local_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            backend: StorageBackend::Local,
            local_root: dir.path().join("store"),
            s3: S3Config::new("us-east-1", "artifacts"),
        };
        let gateway = config.build().await.unwrap();
        assert_eq!(gateway.backend_name(), "local");
        assert!(dir.path().join("store").is_dir());
    }
}
