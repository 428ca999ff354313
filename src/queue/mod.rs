//! Message queue the ingestion endpoint publishes to
//!
//! The API never persists metrics itself: a validated, transformed batch is
//! handed to a [`MessageQueue`] and the request succeeds once the queue has
//! accepted it. Two implementations exist:
//!
//! - [`MemoryQueue`]: a bounded in-process channel, drained by the persister
//!   actor into the in-memory repository
//! - `HttpQueue` (feature `http-queue`): forwards each batch as a JSON array
//!   to a remote collector endpoint

pub mod error;
#[cfg(feature = "http-queue")]
pub mod http;
pub mod memory;

use async_trait::async_trait;

use crate::transform::TransformedMetric;

pub use error::QueueError;
#[cfg(feature = "http-queue")]
pub use http::HttpQueue;
pub use memory::MemoryQueue;

/// Destination of accepted metric batches
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Publish one batch; the whole batch is accepted or rejected
    async fn send_batch(&self, batch: Vec<TransformedMetric>) -> Result<(), QueueError>;
}
