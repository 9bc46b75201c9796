//! Job execution: the shared model cache and the per-job pipeline.
//!
//! - [`ModelCache`]: loads each catalog model at most once and shares the
//!   handle across every job that names it.
//! - [`JobExecutor`]: runs one job's steps inside a scratch directory and
//!   turns every failure into a terminal [`JobFailure`](atelier_core::error::JobFailure).

pub mod cache;
pub mod error;
pub mod executor;

pub use cache::{CacheError, LoadState, ModelCache};
pub use error::ExecutionError;
pub use executor::{ExecutorConfig, JobExecutor};
