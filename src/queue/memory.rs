//! Bounded in-process queue

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::trace;

use super::{MessageQueue, QueueError};
use crate::transform::TransformedMetric;

/// A batch as it travels through the in-memory queue
pub type Batch = Vec<TransformedMetric>;

/// Sending half of the in-memory queue
///
/// Publishing fails fast with [`QueueError::Full`] instead of waiting for
/// capacity, so a stalled consumer surfaces as 503 rather than hung requests.
#[derive(Debug, Clone)]
pub struct MemoryQueue {
    sender: mpsc::Sender<Batch>,
}

impl MemoryQueue {
    /// Create a queue holding up to `capacity` batches, plus its consumer end
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Batch>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn send_batch(&self, batch: Vec<TransformedMetric>) -> Result<(), QueueError> {
        trace!("queueing batch of {} metrics", batch.len());

        self.sender.try_send(batch).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }
}
