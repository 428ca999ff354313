//! In-memory metrics repository
//!
//! Keeps every persisted measurement in a vector behind a `RwLock` and answers
//! the four read queries by scanning it. It's useful for:
//! - Running the API without external infrastructure
//! - Testing the read endpoints end-to-end
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **Linear scans**: Every query walks the whole store

use std::collections::{BTreeMap, BTreeSet};
use std::hash::{DefaultHasher, Hash, Hasher};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::backend::MetricsRepository;
use super::error::{RepositoryError, RepositoryResult};
use super::schema::{
    Measurement, MeasurementSeries, MetricDefinition, MetricName, StatisticsRow,
    StatisticsSeries,
};
use crate::Dimensions;
use crate::pagination::{RowKey, SeriesOffset, row_keys};
use crate::query::{
    ListMetricsQuery, ListNamesQuery, MeasurementsQuery, Statistic, StatisticsQuery,
    epoch_to_datetime,
};
use crate::transform::TransformedMetric;

/// Stable identifier of a metric definition within a tenant and region
pub fn metric_id(tenant_id: &str, region: &str, name: &str, dimensions: &Dimensions) -> String {
    let mut hasher = DefaultHasher::new();
    tenant_id.hash(&mut hasher);
    region.hash(&mut hasher);
    name.hash(&mut hasher);
    dimensions.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[derive(Debug, Clone)]
struct StoredMeasurement {
    id: String,
    tenant_id: String,
    region: String,
    name: String,
    dimensions: Dimensions,
    timestamp: DateTime<Utc>,
    value: f64,
}

impl StoredMeasurement {
    fn from_transformed(queued: TransformedMetric) -> Option<Self> {
        let timestamp = epoch_to_datetime(queued.metric.timestamp_secs())?;
        let value = queued.metric.value_f64();
        let TransformedMetric { metric, meta } = queued;

        Some(Self {
            id: metric_id(&meta.tenant_id, &meta.region, &metric.name, &metric.dimensions),
            tenant_id: meta.tenant_id,
            region: meta.region,
            name: metric.name,
            dimensions: metric.dimensions,
            timestamp,
            value,
        })
    }

    fn matches(
        &self,
        tenant_id: &str,
        region: &str,
        name: Option<&str>,
        dimensions: &Dimensions,
    ) -> bool {
        self.tenant_id == tenant_id
            && self.region == region
            && name.is_none_or(|name| self.name == name)
            && dimensions
                .iter()
                .all(|(key, value)| self.dimensions.get(key) == Some(value))
    }

    fn in_window(&self, start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> bool {
        self.timestamp >= start && end.is_none_or(|end| self.timestamp < end)
    }
}

/// Identity of a result series
#[derive(Debug, Clone)]
struct SeriesHead {
    id: String,
    name: String,
    dimensions: Dimensions,
}

/// In-memory repository backend
#[derive(Debug, Default)]
pub struct MemoryRepository {
    measurements: RwLock<Vec<StoredMeasurement>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a batch taken off the queue, returning how many were kept
    ///
    /// Metrics whose timestamp cannot be represented are dropped with a warning.
    pub async fn insert_batch(&self, batch: Vec<TransformedMetric>) -> usize {
        let mut rows = Vec::with_capacity(batch.len());
        for queued in batch {
            let name = queued.metric.name.clone();
            match StoredMeasurement::from_transformed(queued) {
                Some(row) => rows.push(row),
                None => warn!("dropping metric {name} with unrepresentable timestamp"),
            }
        }

        let stored = rows.len();
        self.measurements.write().await.extend(rows);
        stored
    }

    /// Total number of stored measurements
    pub async fn len(&self) -> usize {
        self.measurements.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Matching rows grouped into series, each series sorted by timestamp
    async fn series(
        &self,
        tenant_id: &str,
        region: &str,
        name: &str,
        dimensions: &Dimensions,
        window: (DateTime<Utc>, Option<DateTime<Utc>>),
        merge_metrics: bool,
    ) -> Vec<(SeriesHead, Vec<(DateTime<Utc>, f64)>)> {
        let store = self.measurements.read().await;
        let mut groups: BTreeMap<String, (SeriesHead, Vec<(DateTime<Utc>, f64)>)> =
            BTreeMap::new();

        for row in store
            .iter()
            .filter(|row| row.matches(tenant_id, region, Some(name), dimensions))
            .filter(|row| row.in_window(window.0, window.1))
        {
            let head = if merge_metrics {
                SeriesHead {
                    id: metric_id(tenant_id, region, name, dimensions),
                    name: name.to_string(),
                    dimensions: dimensions.clone(),
                }
            } else {
                SeriesHead {
                    id: row.id.clone(),
                    name: row.name.clone(),
                    dimensions: row.dimensions.clone(),
                }
            };

            groups
                .entry(head.id.clone())
                .or_insert_with(|| (head, Vec::new()))
                .1
                .push((row.timestamp, row.value));
        }

        groups
            .into_values()
            .map(|(head, mut points)| {
                points.sort_by_key(|(timestamp, _)| *timestamp);
                (head, points)
            })
            .collect()
    }
}

fn parse_offset(offset: Option<&str>) -> RepositoryResult<Option<SeriesOffset>> {
    offset
        .map(|raw| SeriesOffset::parse(raw).ok_or_else(|| RepositoryError::InvalidOffset(raw.to_string())))
        .transpose()
}

/// Keep the `limit` first rows after `offset` across all series
///
/// Rows are ordered by [`RowKey`], so a cursor resumes at exactly the row
/// after the last one returned, even inside a run of equal timestamps.
fn take_page<R>(
    series: Vec<(SeriesHead, Vec<(DateTime<Utc>, R)>)>,
    offset: Option<&SeriesOffset>,
    limit: usize,
) -> Vec<(SeriesHead, Vec<R>)> {
    let series: Vec<(SeriesHead, Vec<(RowKey, R)>)> = series
        .into_iter()
        .map(|(head, rows)| {
            let keys = row_keys(&head.id, rows.iter().map(|(timestamp, _)| *timestamp), None);
            let rows = keys
                .into_iter()
                .zip(rows)
                .map(|(key, (_, row))| (key, row))
                .filter(|(key, _)| offset.is_none_or(|offset| offset.admits(key)))
                .collect();
            (head, rows)
        })
        .collect();

    let cutoff = {
        let mut keys: Vec<&RowKey> = series
            .iter()
            .flat_map(|(_, rows)| rows.iter().map(|(key, _)| key))
            .collect();
        keys.sort();
        (limit > 0 && keys.len() > limit).then(|| keys[limit - 1].clone())
    };

    series
        .into_iter()
        .filter_map(|(head, rows)| {
            let rows: Vec<R> = rows
                .into_iter()
                .filter(|(key, _)| cutoff.as_ref().is_none_or(|cutoff| key <= cutoff))
                .map(|(_, row)| row)
                .collect();
            (!rows.is_empty()).then_some((head, rows))
        })
        .collect()
}

fn aggregate(statistic: Statistic, values: &[f64]) -> f64 {
    match statistic {
        Statistic::Avg => values.iter().sum::<f64>() / values.len() as f64,
        Statistic::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        Statistic::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Statistic::Count => values.len() as f64,
        Statistic::Sum => values.iter().sum(),
    }
}

fn bucket_points(
    points: Vec<(DateTime<Utc>, f64)>,
    start: DateTime<Utc>,
    period: u64,
    statistics: &BTreeSet<Statistic>,
) -> Vec<(DateTime<Utc>, StatisticsRow)> {
    let period_secs = i64::try_from(period).unwrap_or(i64::MAX);
    let mut buckets: BTreeMap<DateTime<Utc>, Vec<f64>> = BTreeMap::new();

    for (timestamp, value) in points {
        let index = (timestamp - start).num_seconds().div_euclid(period_secs);
        let bucket = start + Duration::seconds(index.saturating_mul(period_secs));
        buckets.entry(bucket).or_default().push(value);
    }

    buckets
        .into_iter()
        .map(|(timestamp, values)| {
            let row = StatisticsRow {
                timestamp,
                values: statistics
                    .iter()
                    .map(|statistic| aggregate(*statistic, &values))
                    .collect(),
            };
            (timestamp, row)
        })
        .collect()
}

#[async_trait]
impl MetricsRepository for MemoryRepository {
    async fn list_metrics(
        &self,
        tenant_id: &str,
        region: &str,
        query: &ListMetricsQuery,
    ) -> RepositoryResult<Vec<MetricDefinition>> {
        debug!("listing metrics for tenant {tenant_id} in {region}");

        let store = self.measurements.read().await;
        let mut definitions: BTreeMap<&str, MetricDefinition> = BTreeMap::new();

        for row in store
            .iter()
            .filter(|row| row.matches(tenant_id, region, query.name.as_deref(), &query.dimensions))
        {
            definitions
                .entry(row.id.as_str())
                .or_insert_with(|| MetricDefinition {
                    id: row.id.clone(),
                    name: row.name.clone(),
                    dimensions: row.dimensions.clone(),
                });
        }

        Ok(definitions
            .into_values()
            .filter(|definition| {
                query
                    .offset
                    .as_deref()
                    .is_none_or(|offset| definition.id.as_str() > offset)
            })
            .take(query.limit)
            .collect())
    }

    async fn list_metric_names(
        &self,
        tenant_id: &str,
        region: &str,
        query: &ListNamesQuery,
    ) -> RepositoryResult<Vec<MetricName>> {
        debug!("listing metric names for tenant {tenant_id} in {region}");

        let store = self.measurements.read().await;
        let names: BTreeSet<&str> = store
            .iter()
            .filter(|row| row.matches(tenant_id, region, None, &query.dimensions))
            .map(|row| row.name.as_str())
            .collect();

        Ok(names
            .into_iter()
            .filter(|name| query.offset.as_deref().is_none_or(|offset| *name > offset))
            .take(query.limit)
            .map(|name| MetricName {
                name: name.to_string(),
            })
            .collect())
    }

    async fn measurement_list(
        &self,
        tenant_id: &str,
        region: &str,
        query: &MeasurementsQuery,
    ) -> RepositoryResult<Vec<MeasurementSeries>> {
        debug!("listing measurements of {} for tenant {tenant_id}", query.name);

        let offset = parse_offset(query.offset.as_deref())?;
        let series = self
            .series(
                tenant_id,
                region,
                &query.name,
                &query.dimensions,
                (query.start_time, query.end_time),
                query.merge_metrics,
            )
            .await;

        let series = series
            .into_iter()
            .map(|(head, points)| {
                let rows = points
                    .into_iter()
                    .map(|(timestamp, value)| (timestamp, Measurement { timestamp, value }))
                    .collect();
                (head, rows)
            })
            .collect();

        Ok(take_page(series, offset.as_ref(), query.limit)
            .into_iter()
            .map(|(head, measurements)| MeasurementSeries {
                id: head.id,
                name: head.name,
                dimensions: head.dimensions,
                columns: MeasurementSeries::COLUMNS.map(String::from).to_vec(),
                measurements,
            })
            .collect())
    }

    async fn metrics_statistics(
        &self,
        tenant_id: &str,
        region: &str,
        query: &StatisticsQuery,
    ) -> RepositoryResult<Vec<StatisticsSeries>> {
        debug!("computing statistics of {} for tenant {tenant_id}", query.name);

        let offset = parse_offset(query.offset.as_deref())?;
        let series = self
            .series(
                tenant_id,
                region,
                &query.name,
                &query.dimensions,
                (query.start_time, query.end_time),
                query.merge_metrics,
            )
            .await;

        let series = series
            .into_iter()
            .map(|(head, points)| {
                let rows = bucket_points(points, query.start_time, query.period, &query.statistics);
                (head, rows)
            })
            .collect();

        let columns: Vec<String> = std::iter::once("timestamp")
            .chain(query.statistics.iter().map(Statistic::as_str))
            .map(String::from)
            .collect();

        Ok(take_page(series, offset.as_ref(), query.limit)
            .into_iter()
            .map(|(head, statistics)| StatisticsSeries {
                id: head.id,
                name: head.name,
                dimensions: head.dimensions,
                columns: columns.clone(),
                statistics,
            })
            .collect())
    }
}
