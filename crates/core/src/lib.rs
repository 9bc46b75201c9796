//! Domain types shared by every Atelier crate.
//!
//! Kept free of async runtimes and I/O clients so that storage, adapters,
//! the pipeline, and the broker can all depend on it without pulling in
//! each other.

pub mod error;
pub mod job;
pub mod locator;
pub mod model;
pub mod params;
pub mod types;
