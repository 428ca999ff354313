//! Query-string normalization for the read endpoints
//!
//! Raw `key=value` pairs are parsed into one typed query per endpoint. Parsing
//! stops at the first invalid parameter and reports it by name; nothing past
//! this module ever looks at raw query strings.
//!
//! Every typed query can be encoded back into a query string with
//! `to_query_string`, and normalizing that string yields an equal query.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::{Dimensions, MAX_DIMENSION_LENGTH, MAX_NAME_LENGTH};

/// Default page size when the request carries no `limit`
pub const DEFAULT_LIMIT: usize = 1000;

/// Upper bound applied to any requested `limit`
pub const MAX_LIMIT: usize = 10_000;

/// Decoded query-string pairs, in request order, repeated keys preserved
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    /// Decode an `application/x-www-form-urlencoded` query string
    pub fn parse(raw: &str) -> Self {
        Self {
            pairs: form_urlencoded::parse(raw.as_bytes())
                .into_owned()
                .collect(),
        }
    }

    pub fn from_raw(raw: Option<&str>) -> Self {
        raw.map(Self::parse).unwrap_or_default()
    }

    /// First value for `key`
    pub fn get<'a>(&'a self, key: &str) -> Option<&'a str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All values for `key`, in request order
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First value found under any of `keys`, trying them in order
    fn get_any(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.get(key))
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }
}

/// A query parameter could not be normalized
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid query parameter '{param}': {reason}")]
pub struct QueryError {
    pub param: &'static str,
    pub reason: String,
}

impl QueryError {
    fn new(param: &'static str, reason: impl Into<String>) -> Self {
        Self {
            param,
            reason: reason.into(),
        }
    }
}

type QueryResult<T> = Result<T, QueryError>;

/// Aggregations available on the statistics endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Statistic {
    Avg,
    Min,
    Max,
    Count,
    Sum,
}

impl Statistic {
    pub const ALL: [Statistic; 5] = [
        Statistic::Avg,
        Statistic::Min,
        Statistic::Max,
        Statistic::Count,
        Statistic::Sum,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Statistic::Avg => "avg",
            Statistic::Min => "min",
            Statistic::Max => "max",
            Statistic::Count => "count",
            Statistic::Sum => "sum",
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Statistic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Statistic::ALL
            .into_iter()
            .find(|statistic| statistic.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown statistic '{s}'"))
    }
}

/// Page size policy applied to every read endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default: usize,
    pub max: usize,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default: DEFAULT_LIMIT,
            max: MAX_LIMIT,
        }
    }
}

/// GET /v2.0/metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListMetricsQuery {
    pub name: Option<String>,
    pub dimensions: Dimensions,
    pub offset: Option<String>,
    pub limit: usize,
}

impl ListMetricsQuery {
    pub fn from_params(params: &QueryParams, limits: &PageLimits) -> QueryResult<Self> {
        Ok(Self {
            name: parse_name(params, false)?,
            dimensions: parse_dimensions(params)?,
            offset: parse_offset(params),
            limit: parse_limit(params, limits)?,
        })
    }

    pub fn to_query_string(&self) -> String {
        let mut encoder = QueryEncoder::new();
        encoder.name(self.name.as_deref());
        encoder.dimensions(&self.dimensions);
        encoder.offset(self.offset.as_deref());
        encoder.limit(self.limit);
        encoder.finish()
    }
}

/// GET /v2.0/metrics/names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListNamesQuery {
    pub dimensions: Dimensions,
    pub offset: Option<String>,
    pub limit: usize,
}

impl ListNamesQuery {
    pub fn from_params(params: &QueryParams, limits: &PageLimits) -> QueryResult<Self> {
        Ok(Self {
            dimensions: parse_dimensions(params)?,
            offset: parse_offset(params),
            limit: parse_limit(params, limits)?,
        })
    }

    pub fn to_query_string(&self) -> String {
        let mut encoder = QueryEncoder::new();
        encoder.dimensions(&self.dimensions);
        encoder.offset(self.offset.as_deref());
        encoder.limit(self.limit);
        encoder.finish()
    }
}

/// GET /v2.0/metrics/measurements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementsQuery {
    pub name: String,
    pub dimensions: Dimensions,
    pub start_time: DateTime<Utc>,

    /// Absent means "up to now"; the repository decides what that is
    pub end_time: Option<DateTime<Utc>>,
    pub offset: Option<String>,
    pub limit: usize,
    pub merge_metrics: bool,
}

impl MeasurementsQuery {
    pub fn from_params(params: &QueryParams, limits: &PageLimits) -> QueryResult<Self> {
        let name = require_name(params)?;
        let dimensions = parse_dimensions(params)?;
        let start_time = parse_start_time(params)?;
        let end_time = parse_end_time(params, start_time)?;

        Ok(Self {
            name,
            dimensions,
            start_time,
            end_time,
            offset: parse_offset(params),
            limit: parse_limit(params, limits)?,
            merge_metrics: parse_merge_metrics(params)?,
        })
    }

    pub fn to_query_string(&self) -> String {
        let mut encoder = QueryEncoder::new();
        encoder.name(Some(&self.name));
        encoder.dimensions(&self.dimensions);
        encoder.time("start_time", Some(self.start_time));
        encoder.time("end_time", self.end_time);
        encoder.offset(self.offset.as_deref());
        encoder.limit(self.limit);
        encoder.merge_metrics(self.merge_metrics);
        encoder.finish()
    }
}

/// GET /v2.0/metrics/statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatisticsQuery {
    pub name: String,
    pub dimensions: Dimensions,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,

    /// Never empty; iteration follows the canonical avg, min, max, count, sum order
    pub statistics: BTreeSet<Statistic>,

    /// Bucket width in seconds
    pub period: u64,
    pub offset: Option<String>,
    pub limit: usize,
    pub merge_metrics: bool,
}

impl StatisticsQuery {
    pub fn from_params(params: &QueryParams, limits: &PageLimits) -> QueryResult<Self> {
        let name = require_name(params)?;
        let dimensions = parse_dimensions(params)?;
        let statistics = parse_statistics(params)?;
        let period = parse_period(params)?;
        let start_time = parse_start_time(params)?;
        let end_time = parse_end_time(params, start_time)?;

        Ok(Self {
            name,
            dimensions,
            start_time,
            end_time,
            statistics,
            period,
            offset: parse_offset(params),
            limit: parse_limit(params, limits)?,
            merge_metrics: parse_merge_metrics(params)?,
        })
    }

    pub fn to_query_string(&self) -> String {
        let mut encoder = QueryEncoder::new();
        encoder.name(Some(&self.name));
        encoder.dimensions(&self.dimensions);
        encoder.time("start_time", Some(self.start_time));
        encoder.time("end_time", self.end_time);
        encoder.statistics(&self.statistics);
        encoder.period(self.period);
        encoder.offset(self.offset.as_deref());
        encoder.limit(self.limit);
        encoder.merge_metrics(self.merge_metrics);
        encoder.finish()
    }
}

// ============================================================================
// Parameter parsers
// ============================================================================

fn parse_name(params: &QueryParams, required: bool) -> QueryResult<Option<String>> {
    match params.get("name") {
        None if required => Err(QueryError::new("name", "is required")),
        None => Ok(None),
        Some("") => Err(QueryError::new("name", "must not be empty")),
        Some(name) if name.chars().count() > MAX_NAME_LENGTH => Err(QueryError::new(
            "name",
            format!("exceeds {MAX_NAME_LENGTH} characters"),
        )),
        Some(name) => Ok(Some(name.to_string())),
    }
}

fn require_name(params: &QueryParams) -> QueryResult<String> {
    parse_name(params, true)?.ok_or_else(|| QueryError::new("name", "is required"))
}

/// Parse `key:value,key2:value2` lists, possibly spread over repeated parameters
fn parse_dimensions(params: &QueryParams) -> QueryResult<Dimensions> {
    let mut dimensions = Dimensions::new();

    for raw in params.get_all("dimensions").filter(|raw| !raw.is_empty()) {
        for part in raw.split(',') {
            let (key, value) = part
                .split_once(':')
                .ok_or_else(|| QueryError::new("dimensions", format!("'{part}' is not a key:value pair")))?;

            if key.is_empty() || value.is_empty() {
                return Err(QueryError::new(
                    "dimensions",
                    format!("'{part}' needs a non-empty key and value"),
                ));
            }
            if key.chars().count() > MAX_DIMENSION_LENGTH
                || value.chars().count() > MAX_DIMENSION_LENGTH
            {
                return Err(QueryError::new(
                    "dimensions",
                    format!("'{key}' exceeds {MAX_DIMENSION_LENGTH} characters"),
                ));
            }
            if dimensions.insert(key.to_string(), value.to_string()).is_some() {
                return Err(QueryError::new(
                    "dimensions",
                    format!("duplicate dimension '{key}'"),
                ));
            }
        }
    }

    Ok(dimensions)
}

fn parse_start_time(params: &QueryParams) -> QueryResult<DateTime<Utc>> {
    let raw = params
        .get_any(&["start_time", "start_timestamp"])
        .ok_or_else(|| QueryError::new("start_time", "is required"))?;

    parse_timestamp(raw).ok_or_else(|| QueryError::new("start_time", format!("'{raw}' is not a timestamp")))
}

fn parse_end_time(
    params: &QueryParams,
    start_time: DateTime<Utc>,
) -> QueryResult<Option<DateTime<Utc>>> {
    let Some(raw) = params.get_any(&["end_time", "end_timestamp"]) else {
        return Ok(None);
    };

    let end_time = parse_timestamp(raw)
        .ok_or_else(|| QueryError::new("end_time", format!("'{raw}' is not a timestamp")))?;

    if end_time < start_time {
        return Err(QueryError::new("end_time", "must not be before start_time"));
    }

    Ok(Some(end_time))
}

/// Years that RFC 3339 can spell, and so the only ones a query may carry
const YEAR_RANGE: RangeInclusive<i32> = 0..=9999;

/// Parse an RFC 3339 / ISO 8601 timestamp or fractional epoch seconds
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(secs) = raw.parse::<f64>() {
        return epoch_to_datetime(secs);
    }

    let timestamp = match DateTime::parse_from_rfc3339(raw) {
        Ok(timestamp) => timestamp.with_timezone(&Utc),
        Err(_) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()?
            .and_utc(),
    };
    YEAR_RANGE.contains(&timestamp.year()).then_some(timestamp)
}

/// Convert fractional epoch seconds, rejecting non-finite values and years
/// outside 0000-9999
pub fn epoch_to_datetime(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }

    let whole = secs.floor();
    let mut seconds = whole as i64;
    let mut nanos = ((secs - whole) * 1e9).round() as u32;
    if nanos >= 1_000_000_000 {
        seconds += 1;
        nanos = 0;
    }

    DateTime::from_timestamp(seconds, nanos)
        .filter(|timestamp| YEAR_RANGE.contains(&timestamp.year()))
}

fn parse_statistics(params: &QueryParams) -> QueryResult<BTreeSet<Statistic>> {
    let mut statistics = BTreeSet::new();

    for raw in params.get_all("statistics") {
        for token in raw.split(',') {
            let statistic = token
                .parse::<Statistic>()
                .map_err(|reason| QueryError::new("statistics", reason))?;
            statistics.insert(statistic);
        }
    }

    if statistics.is_empty() {
        return Err(QueryError::new("statistics", "is required"));
    }

    Ok(statistics)
}

fn parse_period(params: &QueryParams) -> QueryResult<u64> {
    let raw = params
        .get("period")
        .ok_or_else(|| QueryError::new("period", "is required"))?;

    match raw.parse::<u64>() {
        Ok(period) if period > 0 => Ok(period),
        _ => Err(QueryError::new(
            "period",
            format!("'{raw}' is not a positive number of seconds"),
        )),
    }
}

fn parse_offset(params: &QueryParams) -> Option<String> {
    params.get("offset").map(str::to_string)
}

fn parse_limit(params: &QueryParams, limits: &PageLimits) -> QueryResult<usize> {
    let Some(raw) = params.get("limit") else {
        return Ok(limits.default);
    };

    match raw.parse::<usize>() {
        Ok(limit) if limit > 0 => Ok(limit.min(limits.max)),
        _ => Err(QueryError::new(
            "limit",
            format!("'{raw}' is not a positive integer"),
        )),
    }
}

fn parse_merge_metrics(params: &QueryParams) -> QueryResult<bool> {
    match params.get("merge_metrics") {
        None => Ok(false),
        Some(raw) => parse_bool(raw).ok_or_else(|| {
            QueryError::new("merge_metrics", format!("'{raw}' is not a boolean"))
        }),
    }
}

/// Conventional truthy/falsy vocabulary, case-insensitive
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "t" | "on" => Some(true),
        "false" | "0" | "no" | "n" | "f" | "off" => Some(false),
        _ => None,
    }
}

/// Builds the canonical query string of a typed query
struct QueryEncoder {
    serializer: form_urlencoded::Serializer<'static, String>,
}

impl QueryEncoder {
    fn new() -> Self {
        Self {
            serializer: form_urlencoded::Serializer::new(String::new()),
        }
    }

    fn name(&mut self, name: Option<&str>) {
        if let Some(name) = name {
            self.serializer.append_pair("name", name);
        }
    }

    fn dimensions(&mut self, dimensions: &Dimensions) {
        if dimensions.is_empty() {
            return;
        }
        let encoded = dimensions
            .iter()
            .map(|(key, value)| format!("{key}:{value}"))
            .collect::<Vec<_>>()
            .join(",");
        self.serializer.append_pair("dimensions", &encoded);
    }

    fn time(&mut self, key: &str, time: Option<DateTime<Utc>>) {
        if let Some(time) = time {
            self.serializer
                .append_pair(key, &time.to_rfc3339_opts(SecondsFormat::AutoSi, true));
        }
    }

    fn statistics(&mut self, statistics: &BTreeSet<Statistic>) {
        let encoded = statistics
            .iter()
            .map(Statistic::as_str)
            .collect::<Vec<_>>()
            .join(",");
        self.serializer.append_pair("statistics", &encoded);
    }

    fn period(&mut self, period: u64) {
        self.serializer.append_pair("period", &period.to_string());
    }

    fn offset(&mut self, offset: Option<&str>) {
        if let Some(offset) = offset {
            self.serializer.append_pair("offset", offset);
        }
    }

    fn limit(&mut self, limit: usize) {
        self.serializer.append_pair("limit", &limit.to_string());
    }

    fn merge_metrics(&mut self, merge_metrics: bool) {
        if merge_metrics {
            self.serializer.append_pair("merge_metrics", "true");
        }
    }

    fn finish(mut self) -> String {
        self.serializer.finish()
    }
}
