use thiserror::Error;

/// Why a batch could not be published
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("message queue is closed")]
    Closed,

    #[error("message queue is full")]
    Full,

    #[error("message queue transport failed: {0}")]
    Transport(String),

    #[error("message queue rejected batch with status {status}")]
    Rejected { status: u16 },
}
