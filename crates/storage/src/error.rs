use atelier_core::locator::Locator;

/// Failure moving bytes to or from object storage.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Nothing is stored under the locator.
    #[error("Object not found: {0}")]
    NotFound(Locator),

    /// The locator is not one this backend can dereference.
    #[error("Invalid locator '{locator}': {reason}")]
    InvalidLocator { locator: Locator, reason: String },

    /// The destination hint cannot be used as a key.
    #[error("Invalid destination '{0}'")]
    InvalidDestination(String),

    /// The backend rejected the credentials or the caller lacks access.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Network, service, or filesystem failure.
    #[error("Transfer failed: {0}")]
    Backend(String),
}

impl TransferError {
    pub fn invalid_locator(locator: &Locator, reason: impl Into<String>) -> Self {
        Self::InvalidLocator {
            locator: locator.clone(),
            reason: reason.into(),
        }
    }
}
