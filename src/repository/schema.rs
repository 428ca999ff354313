//! Result rows returned by metrics repositories
//!
//! Measurement and statistics results are grouped into series: one series
//! per metric definition, or a single series when metrics are merged. Rows
//! inside a series serialize as positional arrays described by `columns`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

use crate::Dimensions;

/// Render a timestamp the way every result row does
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A distinct metric (name plus dimensions) known to the repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub id: String,
    pub name: String,
    pub dimensions: Dimensions,
}

/// A distinct metric name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricName {
    pub name: String,
}

/// One raw measurement, serialized as `[timestamp, value, value_meta]`
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Serialize for Measurement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(3))?;
        seq.serialize_element(&format_timestamp(&self.timestamp))?;
        seq.serialize_element(&self.value)?;
        seq.serialize_element(&serde_json::Map::new())?;
        seq.end()
    }
}

/// Measurements of one metric (or of all merged metrics)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementSeries {
    pub id: String,
    pub name: String,
    pub dimensions: Dimensions,
    pub columns: Vec<String>,
    pub measurements: Vec<Measurement>,
}

impl MeasurementSeries {
    pub const COLUMNS: [&'static str; 3] = ["timestamp", "value", "value_meta"];
}

/// One statistics bucket, serialized as `[timestamp, stat1, stat2, ...]`
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsRow {
    /// Start of the bucket
    pub timestamp: DateTime<Utc>,

    /// One value per requested statistic, in column order
    pub values: Vec<f64>,
}

impl Serialize for StatisticsRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.values.len() + 1))?;
        seq.serialize_element(&format_timestamp(&self.timestamp))?;
        for value in &self.values {
            seq.serialize_element(value)?;
        }
        seq.end()
    }
}

/// Period-bucketed statistics of one metric (or of all merged metrics)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsSeries {
    pub id: String,
    pub name: String,
    pub dimensions: Dimensions,
    pub columns: Vec<String>,
    pub statistics: Vec<StatisticsRow>,
}
