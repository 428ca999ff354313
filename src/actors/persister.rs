//! PersisterActor - drains the in-memory queue into the repository
//!
//! This closes the loop for single-process deployments: metrics accepted by
//! the ingestion endpoint become visible to the read endpoints once the
//! persister has stored their batch.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, instrument, trace, warn};

use super::messages::{PersisterCommand, PersisterStats};
use crate::queue::memory::Batch;
use crate::repository::MemoryRepository;

pub struct PersisterActor {
    repository: Arc<MemoryRepository>,

    /// Consumer end of the in-memory queue
    batch_rx: mpsc::Receiver<Batch>,

    command_rx: mpsc::Receiver<PersisterCommand>,

    stats: PersisterStats,
}

impl PersisterActor {
    pub fn new(
        repository: Arc<MemoryRepository>,
        batch_rx: mpsc::Receiver<Batch>,
        command_rx: mpsc::Receiver<PersisterCommand>,
    ) -> Self {
        Self {
            repository,
            batch_rx,
            command_rx,
            stats: PersisterStats::default(),
        }
    }

    /// Run the actor's main loop
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting persister actor");

        loop {
            tokio::select! {
                batch = self.batch_rx.recv() => {
                    match batch {
                        Some(batch) => self.store(batch).await,
                        None => {
                            debug!("queue closed, shutting down");
                            break;
                        }
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        PersisterCommand::GetStats { respond_to } => {
                            let _ = respond_to.send(self.stats.clone());
                        }
                        PersisterCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }
            }
        }

        // Drain what was accepted before shutdown
        self.batch_rx.close();
        while let Some(batch) = self.batch_rx.recv().await {
            self.store(batch).await;
        }

        debug!(
            "persister stopped after {} batches ({} metrics)",
            self.stats.batches, self.stats.metrics_stored
        );
    }

    async fn store(&mut self, batch: Batch) {
        let received = batch.len();
        let stored = self.repository.insert_batch(batch).await;
        trace!("persisted {stored} of {received} metrics");

        if stored < received {
            warn!("dropped {} metrics from batch", received - stored);
        }

        self.stats.batches += 1;
        self.stats.metrics_stored += stored as u64;
        self.stats.metrics_dropped += (received - stored) as u64;
    }
}

/// Handle for controlling the PersisterActor
#[derive(Clone)]
pub struct PersisterHandle {
    sender: mpsc::Sender<PersisterCommand>,
}

impl PersisterHandle {
    /// Spawn a persister consuming `batch_rx`
    pub fn spawn(repository: Arc<MemoryRepository>, batch_rx: mpsc::Receiver<Batch>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = PersisterActor::new(repository, batch_rx, cmd_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Get persister statistics
    pub async fn get_stats(&self) -> Option<PersisterStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PersisterCommand::GetStats { respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()
    }

    /// Shut down the actor
    pub async fn shutdown(&self) {
        let _ = self.sender.send(PersisterCommand::Shutdown).await;
    }
}
