//! Error types for repository operations

/// Result type alias for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Errors that can occur while querying a metrics repository
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// The pagination cursor does not belong to this result set
    #[error("invalid offset '{0}'")]
    InvalidOffset(String),

    /// The backing store could not be reached
    #[error("metrics repository unavailable: {0}")]
    Unavailable(String),

    /// The backing store rejected or failed the query
    #[error("metrics query failed: {0}")]
    QueryFailed(String),

    /// The call did not complete within the configured bound
    #[error("metrics repository did not answer within {0} seconds")]
    Timeout(u64),
}
