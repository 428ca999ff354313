//! Metrics repository trait definition

use async_trait::async_trait;

use super::error::RepositoryResult;
use super::schema::{MeasurementSeries, MetricDefinition, MetricName, StatisticsSeries};
use crate::query::{ListMetricsQuery, ListNamesQuery, MeasurementsQuery, StatisticsQuery};

/// Read access to stored metrics
///
/// Every method is scoped to one tenant and one region; implementations
/// must never return data of another tenant.
///
/// ## Pagination
///
/// Each query carries an opaque `offset` produced by a previous page and a
/// `limit`. Implementations return at most `limit` entries (rows, for the
/// series-shaped results) strictly after the offset:
///
/// - metric listings resume after the metric id
/// - name listings resume after the name
/// - measurements and statistics resume after the row timestamp
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync` as one instance serves all
/// concurrent requests.
#[async_trait]
pub trait MetricsRepository: Send + Sync {
    /// List distinct metric definitions, ordered by id
    async fn list_metrics(
        &self,
        tenant_id: &str,
        region: &str,
        query: &ListMetricsQuery,
    ) -> RepositoryResult<Vec<MetricDefinition>>;

    /// List distinct metric names, ordered by name
    async fn list_metric_names(
        &self,
        tenant_id: &str,
        region: &str,
        query: &ListNamesQuery,
    ) -> RepositoryResult<Vec<MetricName>>;

    /// Raw measurements in `[start_time, end_time)`, oldest first
    async fn measurement_list(
        &self,
        tenant_id: &str,
        region: &str,
        query: &MeasurementsQuery,
    ) -> RepositoryResult<Vec<MeasurementSeries>>;

    /// Period-bucketed statistics in `[start_time, end_time)`, oldest bucket first
    async fn metrics_statistics(
        &self,
        tenant_id: &str,
        region: &str,
        query: &StatisticsQuery,
    ) -> RepositoryResult<Vec<StatisticsSeries>>;
}
