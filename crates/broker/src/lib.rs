//! Job broker and status store.
//!
//! Submission and execution are decoupled. Clients talk to a [`JobBroker`]
//! (submit, status, list); workers talk to a [`WorkerChannel`] (dequeue,
//! start, finish). Both share a [`JobQueue`] for hand-off and a
//! [`StatusStore`] that owns each job's lifecycle record.

pub mod broker;
pub mod error;
pub mod queue;
pub mod store;

pub use broker::{JobBroker, WorkerChannel};
pub use error::BrokerError;
pub use queue::{ChannelQueue, JobQueue};
pub use store::{MemoryStatusStore, StatusStore};
