//! Message types for actor communication
//!
//! Actors receive work on one channel and control commands on another.
//! Commands that expect an answer carry a oneshot sender.

use tokio::sync::oneshot;

/// Commands that can be sent to the PersisterActor
#[derive(Debug)]
pub enum PersisterCommand {
    /// Get persister statistics
    GetStats {
        respond_to: oneshot::Sender<PersisterStats>,
    },

    /// Stop consuming the queue
    ///
    /// Batches already queued are drained before the actor exits.
    Shutdown,
}

/// Persister statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersisterStats {
    /// Batches taken off the queue
    pub batches: u64,

    /// Metrics written to the repository
    pub metrics_stored: u64,

    /// Metrics dropped because they could not be stored
    pub metrics_dropped: u64,
}
