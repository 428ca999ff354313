pub mod actors;
pub mod api;
pub mod config;
pub mod pagination;
pub mod query;
pub mod queue;
pub mod repository;
pub mod transform;
pub mod util;
pub mod validation;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Number;

/// Dimension labels attached to a metric
///
/// Held in an ordered map so that encodings (query strings, metric ids)
/// are deterministic. Key order carries no meaning.
pub type Dimensions = BTreeMap<String, String>;

/// Maximum length of a metric name (in characters)
pub const MAX_NAME_LENGTH: usize = 64;

/// Maximum length of a dimension key or value (in characters)
pub const MAX_DIMENSION_LENGTH: usize = 255;

/// A single validated metric submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,

    /// Epoch seconds, integral or fractional
    pub timestamp: Number,

    pub value: Number,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dimensions: Dimensions,
}

impl Metric {
    /// Timestamp as fractional epoch seconds
    pub fn timestamp_secs(&self) -> f64 {
        self.timestamp.as_f64().unwrap_or_default()
    }

    pub fn value_f64(&self) -> f64 {
        self.value.as_f64().unwrap_or_default()
    }
}
