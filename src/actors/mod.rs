//! Background actors
//!
//! Each actor runs as an independent async task communicating via Tokio
//! channels and is driven through a cloneable handle.
//!
//! ```text
//!   POST /v2.0/metrics
//!          |
//!          v
//!   MemoryQueue (mpsc) --> PersisterActor --> MemoryRepository
//!                                                   ^
//!   GET /v2.0/metrics/... ---------------------------+
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Work**: batches arrive on the queue's mpsc receiver
//! 2. **Commands**: each actor has an mpsc command channel for control messages
//! 3. **Request/Response**: oneshot channels for synchronous queries

pub mod messages;
pub mod persister;
