//! Queue that forwards batches to a remote HTTP collector

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{MessageQueue, QueueError};
use crate::transform::TransformedMetric;

/// Posts every batch as a JSON array to a fixed URL
///
/// Any 2xx response counts as accepted.
#[derive(Debug, Clone)]
pub struct HttpQueue {
    client: reqwest::Client,
    url: String,
}

impl HttpQueue {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, QueueError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QueueError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl MessageQueue for HttpQueue {
    async fn send_batch(&self, batch: Vec<TransformedMetric>) -> Result<(), QueueError> {
        debug!("forwarding {} metrics to {}", batch.len(), self.url);

        let response = self
            .client
            .post(&self.url)
            .json(&batch)
            .send()
            .await
            .map_err(|e| {
                warn!("failed to reach collector at {}: {e}", self.url);
                QueueError::Transport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!("collector at {} answered {status}", self.url);
            return Err(QueueError::Rejected {
                status: status.as_u16(),
            });
        }

        Ok(())
    }
}
