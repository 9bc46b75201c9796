//! Filesystem storage backend.
//!
//! Objects live under a single root directory. Locators are absolute
//! paths (optionally prefixed with `file://`) and must resolve inside the
//! root.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use atelier_core::locator::Locator;

use crate::error::TransferError;
use crate::gateway::{validate_destination, StorageGateway};

pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Create the root directory if needed and resolve it to an absolute path.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, TransferError> {
        let root = root.as_ref();
        std::fs::create_dir_all(root).map_err(|e| {
            TransferError::Backend(format!("cannot create {}: {e}", root.display()))
        })?;
        let root = root.canonicalize().map_err(|e| {
            TransferError::Backend(format!("cannot resolve {}: {e}", root.display()))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, locator: &Locator) -> Result<PathBuf, TransferError> {
        let raw = locator.as_str();
        let path = Path::new(raw.strip_prefix("file://").unwrap_or(raw));
        if !path.is_absolute() {
            return Err(TransferError::invalid_locator(locator, "expected an absolute path"));
        }
        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(TransferError::invalid_locator(locator, "path traversal"));
        }
        if !path.starts_with(&self.root) {
            return Err(TransferError::invalid_locator(
                locator,
                "outside the storage root",
            ));
        }
        Ok(path.to_path_buf())
    }
}

#[async_trait]
impl StorageGateway for LocalStorage {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    async fn fetch(&self, locator: &Locator) -> Result<Vec<u8>, TransferError> {
        let path = self.path_of(locator)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(TransferError::NotFound(locator.clone()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                Err(TransferError::AccessDenied(format!("{}: {e}", path.display())))
            }
            Err(e) => Err(TransferError::Backend(format!("{}: {e}", path.display()))),
        }
    }

    async fn store(
        &self,
        bytes: Vec<u8>,
        destination_hint: &str,
    ) -> Result<Locator, TransferError> {
        validate_destination(destination_hint)?;
        let path = self.root.join(destination_hint);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TransferError::Backend(format!("{}: {e}", parent.display())))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| TransferError::Backend(format!("{}: {e}", path.display())))?;

        tracing::debug!(path = %path.display(), "Stored object on local filesystem");
        Ok(Locator::new(path.to_string_lossy().into_owned()))
    }
}
