//! Background tasks and scheduled jobs.
//!
//! Each submodule provides a long-running async function intended to be
//! spawned via `tokio::spawn`. Looping tasks accept a [`CancellationToken`]
//! for graceful shutdown; subscribers end when the event bus closes.
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

pub mod event_log;
pub mod job_retention;
