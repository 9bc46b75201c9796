//! Process-local storage backend.

use std::collections::HashMap;

use async_trait::async_trait;
use atelier_core::locator::Locator;
use tokio::sync::RwLock;

use crate::error::TransferError;
use crate::gateway::{validate_destination, StorageGateway};

const SCHEME: &str = "mem://";

/// Blobs kept in a map keyed by object key. Locators are `mem://{key}`.
#[derive(Default)]
pub struct MemoryStorage {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object directly, returning its locator.
    pub async fn insert(&self, key: &str, bytes: Vec<u8>) -> Locator {
        self.objects.write().await.insert(key.to_string(), bytes);
        Locator::new(format!("{SCHEME}{key}"))
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn key_of(locator: &Locator) -> Result<&str, TransferError> {
        locator
            .as_str()
            .strip_prefix(SCHEME)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| TransferError::invalid_locator(locator, "expected mem://{key}"))
    }
}

#[async_trait]
impl StorageGateway for MemoryStorage {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn fetch(&self, locator: &Locator) -> Result<Vec<u8>, TransferError> {
        let key = Self::key_of(locator)?;
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| TransferError::NotFound(locator.clone()))
    }

    async fn store(
        &self,
        bytes: Vec<u8>,
        destination_hint: &str,
    ) -> Result<Locator, TransferError> {
        validate_destination(destination_hint)?;
        Ok(self.insert(destination_hint, bytes).await)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn store_then_fetch() {
        let storage = MemoryStorage::new();
        let loc = storage.store(b"mesh".to_vec(), "outputs/a.glb").await.unwrap();
        assert_eq!(loc.as_str(), "mem://outputs/a.glb");
        assert_eq!(storage.fetch(&loc).await.unwrap(), b"mesh");
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let storage = MemoryStorage::new();
        let err = storage.fetch(&Locator::new("mem://nope")).await.unwrap_err();
        assert_matches!(err, TransferError::NotFound(_));
    }

    #[tokio::test]
    async fn foreign_locator_is_invalid() {
        let storage = MemoryStorage::new();
        let err = storage.fetch(&Locator::new("s3://bucket/key")).await.unwrap_err();
        assert_matches!(err, TransferError::InvalidLocator { .. });
    }
}
