//! Hand-off of accepted jobs from the broker to workers.

use async_trait::async_trait;
use atelier_core::job::JobDescriptor;
use tokio::sync::{mpsc, Mutex};

use crate::error::BrokerError;

/// Default number of descriptors the queue buffers.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Carries descriptors from submitters to consumers. No ordering promise.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Never blocks: a full queue is an error.
    async fn enqueue(&self, descriptor: JobDescriptor) -> Result<(), BrokerError>;

    /// Wait for the next descriptor. `None` once closed and drained.
    async fn dequeue(&self) -> Option<JobDescriptor>;

    /// Next descriptor if one is buffered right now.
    async fn try_dequeue(&self) -> Option<JobDescriptor>;

    /// Refuse further enqueues. Buffered descriptors stay available.
    async fn close(&self);
}

/// In-process [`JobQueue`] over a bounded tokio mpsc channel.
pub struct ChannelQueue {
    sender: mpsc::Sender<JobDescriptor>,
    receiver: Mutex<mpsc::Receiver<JobDescriptor>>,
}

impl ChannelQueue {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }
}

impl Default for ChannelQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

#[async_trait]
impl JobQueue for ChannelQueue {
    async fn enqueue(&self, descriptor: JobDescriptor) -> Result<(), BrokerError> {
        self.sender.try_send(descriptor).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => BrokerError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => BrokerError::QueueClosed,
        })
    }

    async fn dequeue(&self) -> Option<JobDescriptor> {
        self.receiver.lock().await.recv().await
    }

    async fn try_dequeue(&self) -> Option<JobDescriptor> {
        self.receiver.lock().await.try_recv().ok()
    }

    async fn close(&self) {
        self.receiver.lock().await.close();
    }
}
