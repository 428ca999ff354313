//! Shared API response types
//!
//! Kept deserializable so clients (and the integration tests) can decode
//! responses with the same definitions the server encodes them with.

use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

/// Body of every error response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// HTTP status code
    pub code: u16,

    /// Canonical reason phrase of the status
    pub title: String,

    pub message: String,

    /// Offending body field or query parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    /// Position of the offending metric in a batch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}
