//! Adapter capability: load a model family once, predict many times.
//!
//! An [`AdapterLoader`] turns a [`ModelConfig`](atelier_core::model::ModelConfig)
//! into a ready [`ModelAdapter`] handle. Handles are shared by every job
//! that names the model, so `predict` must leave them exactly as it found
//! them.
//!
//! The inference math itself runs in an external model-server process;
//! [`client::ModelServerApi`] is the HTTP client both shipped adapter
//! families use to drive it.

pub mod adapter;
pub mod client;
pub mod diffusion;
pub mod error;
pub mod mesh;
pub mod overlay;
pub mod registry;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use adapter::{AdapterLoader, Artifact, ModelAdapter, OverlayRequest, PredictInput};
pub use client::{ModelServerApi, ModelServerConfig, ModelServerError};
pub use error::AdapterError;
pub use registry::AdapterRegistry;
