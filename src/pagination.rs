//! Cursor-based pagination of repository results
//!
//! Every read endpoint answers with an [`Envelope`]: the page under
//! `elements` plus a `self` link and, when the page is full, a `next` link.
//! The `next` link is the request URI with its `offset` parameter pointing
//! past the last element of the page. A page shorter than the limit has no
//! `next` link, which tells the client the result set is exhausted.
//!
//! Series endpoints page by row. A row is identified by a [`RowKey`]: its
//! timestamp, the id of its series and its position among rows of that
//! series sharing the timestamp. Rows are ordered by that key, so a cursor
//! names exactly one row even when many rows share a timestamp.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use url::form_urlencoded;

use crate::query::parse_timestamp;
use crate::repository::schema::{
    Measurement, MeasurementSeries, MetricDefinition, MetricName, StatisticsRow,
    StatisticsSeries,
};

/// Name of the query parameter carrying the continuation cursor
pub const OFFSET_PARAM: &str = "offset";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub rel: String,
    pub href: String,
}

impl Link {
    fn new(rel: &str, href: impl Into<String>) -> Self {
        Self {
            rel: rel.to_string(),
            href: href.into(),
        }
    }
}

/// Response body of every paginated endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope<T> {
    pub links: Vec<Link>,
    pub elements: Vec<T>,
}

impl<T> Envelope<T> {
    /// The `next` link, if the page was full
    pub fn next_link(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|link| link.rel == "next")
            .map(|link| link.href.as_str())
    }
}

/// Identifies where a listing resumes after an element
pub trait Cursor {
    fn cursor(&self) -> String;
}

impl Cursor for MetricDefinition {
    fn cursor(&self) -> String {
        self.id.clone()
    }
}

impl Cursor for MetricName {
    fn cursor(&self) -> String {
        self.name.clone()
    }
}

/// Position of one row in the ordering shared by all series of a result
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RowKey {
    pub timestamp: DateTime<Utc>,
    pub series_id: String,
    /// Index among the rows of the series with the same timestamp
    pub seq: usize,
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            self.series_id,
            self.seq
        )
    }
}

/// Where a series listing resumes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeriesOffset {
    /// Every row strictly later than the timestamp
    After(DateTime<Utc>),
    /// Every row ordered after the key
    AfterRow(RowKey),
}

impl SeriesOffset {
    /// Accepts a [`RowKey`] cursor or a bare timestamp
    pub fn parse(raw: &str) -> Option<Self> {
        if let Some((timestamp, rest)) = raw.split_once('_') {
            let (series_id, seq) = rest.rsplit_once('_')?;
            return Some(Self::AfterRow(RowKey {
                timestamp: parse_timestamp(timestamp)?,
                series_id: series_id.to_string(),
                seq: seq.parse().ok()?,
            }));
        }
        parse_timestamp(raw).map(Self::After)
    }

    pub fn admits(&self, key: &RowKey) -> bool {
        match self {
            Self::After(timestamp) => key.timestamp > *timestamp,
            Self::AfterRow(cursor) => key > cursor,
        }
    }

    /// First `seq` a page starting here gives rows of `series_id` at `timestamp`
    fn first_seq(&self, series_id: &str, timestamp: DateTime<Utc>) -> usize {
        match self {
            Self::AfterRow(cursor)
                if cursor.timestamp == timestamp && cursor.series_id == series_id =>
            {
                cursor.seq + 1
            }
            _ => 0,
        }
    }
}

/// Keys of a series' rows, which must be sorted by timestamp
///
/// Ties are numbered from where `offset` left off, so keys computed for a
/// page agree with keys computed for the whole series.
pub fn row_keys(
    series_id: &str,
    timestamps: impl IntoIterator<Item = DateTime<Utc>>,
    offset: Option<&SeriesOffset>,
) -> Vec<RowKey> {
    let mut keys: Vec<RowKey> = Vec::new();

    for timestamp in timestamps {
        let seq = match keys.last() {
            Some(previous) if previous.timestamp == timestamp => previous.seq + 1,
            _ => offset.map_or(0, |offset| offset.first_seq(series_id, timestamp)),
        };
        keys.push(RowKey {
            timestamp,
            series_id: series_id.to_string(),
            seq,
        });
    }

    keys
}

/// A series of timestamped rows, paginated by row rather than by series
pub trait Series {
    type Row;

    fn series_id(&self) -> &str;

    fn rows(&self) -> &[Self::Row];

    fn truncate_rows(&mut self, len: usize);

    fn row_timestamp(row: &Self::Row) -> DateTime<Utc>;
}

impl Series for MeasurementSeries {
    type Row = Measurement;

    fn series_id(&self) -> &str {
        &self.id
    }

    fn rows(&self) -> &[Measurement] {
        &self.measurements
    }

    fn truncate_rows(&mut self, len: usize) {
        self.measurements.truncate(len);
    }

    fn row_timestamp(row: &Measurement) -> DateTime<Utc> {
        row.timestamp
    }
}

impl Series for StatisticsSeries {
    type Row = StatisticsRow;

    fn series_id(&self) -> &str {
        &self.id
    }

    fn rows(&self) -> &[StatisticsRow] {
        &self.statistics
    }

    fn truncate_rows(&mut self, len: usize) {
        self.statistics.truncate(len);
    }

    fn row_timestamp(row: &StatisticsRow) -> DateTime<Utc> {
        row.timestamp
    }
}

/// Paginate a plain listing (metric definitions or names)
pub fn paginate<T: Cursor>(mut page: Vec<T>, request_uri: &str, limit: usize) -> Envelope<T> {
    let mut links = vec![Link::new("self", request_uri)];

    if limit > 0 && page.len() >= limit {
        page.truncate(limit);
        if let Some(last) = page.last() {
            links.push(Link::new("next", next_href(request_uri, &last.cursor())));
        }
    }

    Envelope {
        links,
        elements: page,
    }
}

/// Paginate measurement series; the cursor is the key of the last row
pub fn paginate_measurements(
    series: Vec<MeasurementSeries>,
    request_uri: &str,
    limit: usize,
) -> Envelope<MeasurementSeries> {
    paginate_series(series, request_uri, limit)
}

/// Paginate statistics series; the cursor is the key of the last bucket
pub fn paginate_statistics(
    series: Vec<StatisticsSeries>,
    request_uri: &str,
    limit: usize,
) -> Envelope<StatisticsSeries> {
    paginate_series(series, request_uri, limit)
}

fn paginate_series<S: Series>(series: Vec<S>, request_uri: &str, limit: usize) -> Envelope<S> {
    let mut links = vec![Link::new("self", request_uri)];

    let offset = request_offset(request_uri).and_then(|raw| SeriesOffset::parse(&raw));
    let keys: Vec<Vec<RowKey>> = series
        .iter()
        .map(|s| {
            let timestamps = s.rows().iter().map(S::row_timestamp);
            row_keys(s.series_id(), timestamps, offset.as_ref())
        })
        .collect();

    let mut ordered: Vec<&RowKey> = keys.iter().flatten().collect();
    if limit == 0 || ordered.len() < limit {
        return Envelope {
            links,
            elements: series,
        };
    }
    ordered.sort();
    let cutoff = ordered[limit - 1].clone();

    let elements = series
        .into_iter()
        .zip(&keys)
        .filter_map(|(mut s, keys)| {
            let kept = keys.iter().take_while(|key| **key <= cutoff).count();
            s.truncate_rows(kept);
            (kept > 0).then_some(s)
        })
        .collect();

    links.push(Link::new("next", next_href(request_uri, &cutoff.to_string())));

    Envelope { links, elements }
}

/// The `offset` the request was made with
fn request_offset(request_uri: &str) -> Option<String> {
    let (_, query) = request_uri.split_once('?')?;
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == OFFSET_PARAM)
        .map(|(_, value)| value.into_owned())
}

/// The request URI with `offset` replaced by (or extended with) `cursor`
fn next_href(request_uri: &str, cursor: &str) -> String {
    let (base, query) = request_uri.split_once('?').unwrap_or((request_uri, ""));

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        if key != OFFSET_PARAM {
            serializer.append_pair(&key, &value);
        }
    }
    serializer.append_pair(OFFSET_PARAM, cursor);

    format!("{base}?{}", serializer.finish())
}
