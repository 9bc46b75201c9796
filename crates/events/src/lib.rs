//! Job lifecycle events.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`JobEvent`]: one status change of one job.

pub mod bus;

pub use bus::{EventBus, JobEvent};
