//! Metrics repositories serving the read endpoints
//!
//! ## Design
//!
//! - **Trait-based**: `MetricsRepository` is the only thing handlers see
//! - **Async**: All operations are async for compatibility with Tokio
//! - **Cursor-paged**: every call takes the opaque `offset` and `limit` of
//!   its query and returns at most `limit` entries
//!
//! ## Backends
//!
//! - **In-Memory** (default): filters and aggregates in process, fed by the
//!   persister actor draining the in-process queue

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;

pub use backend::MetricsRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use memory::MemoryRepository;
