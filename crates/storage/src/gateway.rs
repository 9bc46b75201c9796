use async_trait::async_trait;
use atelier_core::locator::Locator;

use crate::error::TransferError;

/// Narrow get/put contract against an object store.
///
/// A locator returned by [`store`](StorageGateway::store) must be accepted
/// by a later [`fetch`](StorageGateway::fetch) on the same backend.
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Short backend name for logs and health output.
    fn backend_name(&self) -> &'static str;

    /// Read the blob referenced by `locator`.
    async fn fetch(&self, locator: &Locator) -> Result<Vec<u8>, TransferError>;

    /// Write `bytes` under `destination_hint` (a relative, `/`-separated key)
    /// and return a locator for it.
    async fn store(&self, bytes: Vec<u8>, destination_hint: &str)
        -> Result<Locator, TransferError>;
}

/// Validate a destination hint as a relative object key.
///
/// Rejects empty hints, absolute paths, and `.`/`..` segments so that no
/// backend can be tricked into writing outside its namespace.
pub fn validate_destination(hint: &str) -> Result<(), TransferError> {
    let invalid = hint.is_empty()
        || hint.starts_with('/')
        || hint.contains('\\')
        || hint
            .split('/')
            .any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if invalid {
        return Err(TransferError::InvalidDestination(hint.to_string()));
    }
    Ok(())
}
