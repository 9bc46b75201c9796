//! Storage gateway: uniform get/put of byte blobs behind opaque locators.
//!
//! The pipeline only ever talks to [`StorageGateway`]. Concrete backends:
//!
//! - [`S3Storage`] -- S3 or any S3-compatible service (MinIO, LocalStack).
//! - [`LocalStorage`] -- a directory on the local filesystem.
//! - [`MemoryStorage`] -- process-local map, for tests and development.
//!
//! No backend retries. Whether a [`TransferError`] is fatal is the caller's
//! decision.

pub mod config;
pub mod error;
pub mod gateway;
pub mod local;
pub mod memory;
pub mod s3;

pub use config::{StorageBackend, StorageConfig};
pub use error::TransferError;
pub use gateway::StorageGateway;
pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use s3::{S3Config, S3Storage};
