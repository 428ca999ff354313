//! Metrics endpoints
//!
//! Every handler follows the same pipeline: authorize the caller against the
//! operation's role set, normalize the input, call exactly one collaborator
//! (bounded by a timeout), then shape the response. Input is fully validated
//! before any collaborator is touched.

use std::future::Future;

use axum::{
    Json,
    body::Bytes,
    extract::{OriginalUri, State},
    http::{HeaderMap, StatusCode, header},
};
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, error, instrument};

use crate::api::error::{ApiError, ApiResult};
use crate::api::middleware::Identity;
use crate::api::state::{ApiSettings, ApiState};
use crate::pagination::{
    Envelope, paginate, paginate_measurements, paginate_statistics,
};
use crate::query::{
    ListMetricsQuery, ListNamesQuery, MeasurementsQuery, QueryParams, StatisticsQuery,
};
use crate::repository::schema::{
    MeasurementSeries, MetricDefinition, MetricName, StatisticsSeries,
};
use crate::repository::{RepositoryError, RepositoryResult};
use crate::transform::transform;
use crate::validation::{MetricPayload, validate};

/// Query parameter naming the tenant a delegated write is for
const TENANT_PARAM: &str = "tenant_id";

/// POST /v2.0/metrics
///
/// Accepts a single metric object or a list of them. The batch is validated
/// as a whole and published to the queue in one call; 204 once accepted.
#[instrument(skip_all)]
pub async fn post_metrics(
    State(state): State<ApiState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let settings = &state.settings;
    let identity = state
        .authorizer
        .authorize(&headers, &settings.roles.write_roles())
        .await?;

    let params = QueryParams::from_raw(uri.query());
    let requested_tenant = match params.get(TENANT_PARAM) {
        Some(tenant) if tenant.trim().is_empty() => {
            return Err(ApiError::bad_input(TENANT_PARAM, "tenant_id must not be empty"));
        }
        other => other,
    };
    let tenant_id = identity.resolve_tenant(requested_tenant, &settings.roles.delegate)?;

    require_json(&headers)?;
    let value: Value = serde_json::from_slice(&body).map_err(|e| ApiError::BadInput {
        message: format!("request body is not valid JSON: {e}"),
        field: None,
        index: None,
    })?;

    let metrics = validate(&MetricPayload::from(value))
        .inspect_err(|e| debug!("rejected metrics from tenant {tenant_id}: {e}"))?;
    if metrics.is_empty() {
        debug!("empty batch from tenant {tenant_id}, nothing to queue");
        return Ok(StatusCode::NO_CONTENT);
    }

    let batch = transform(&metrics, &tenant_id, &settings.region);
    let count = batch.len();

    let unavailable = || ApiError::ServiceUnavailable {
        message: "metrics could not be queued, retry later".to_string(),
        retry_after: Some(settings.retry_after_secs),
    };

    match timeout(settings.queue_timeout, state.queue.send_batch(batch)).await {
        Ok(Ok(())) => {
            debug!("queued {count} metrics for tenant {tenant_id}");
            Ok(StatusCode::NO_CONTENT)
        }
        Ok(Err(e)) => {
            error!("failed to queue {count} metrics for tenant {tenant_id}: {e}");
            Err(unavailable())
        }
        Err(_) => {
            error!(
                "queue did not accept {count} metrics within {:?}",
                settings.queue_timeout
            );
            Err(unavailable())
        }
    }
}

/// GET /v2.0/metrics
///
/// Distinct metric definitions, optionally filtered by name and dimensions.
#[instrument(skip_all)]
pub async fn list_metrics(
    State(state): State<ApiState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> ApiResult<Json<Envelope<MetricDefinition>>> {
    let identity = authorize_read(&state, &headers).await?;
    let settings = &state.settings;

    let query = ListMetricsQuery::from_params(&QueryParams::from_raw(uri.query()), &settings.limits)?;
    let page = call_repository(
        settings,
        state
            .repository
            .list_metrics(&identity.tenant_id, &settings.region, &query),
    )
    .await?;

    Ok(Json(paginate(page, &settings.request_uri(&uri), query.limit)))
}

/// GET /v2.0/metrics/names
#[instrument(skip_all)]
pub async fn list_metric_names(
    State(state): State<ApiState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> ApiResult<Json<Envelope<MetricName>>> {
    let identity = authorize_read(&state, &headers).await?;
    let settings = &state.settings;

    let query = ListNamesQuery::from_params(&QueryParams::from_raw(uri.query()), &settings.limits)?;
    let page = call_repository(
        settings,
        state
            .repository
            .list_metric_names(&identity.tenant_id, &settings.region, &query),
    )
    .await?;

    Ok(Json(paginate(page, &settings.request_uri(&uri), query.limit)))
}

/// GET /v2.0/metrics/measurements
#[instrument(skip_all)]
pub async fn list_measurements(
    State(state): State<ApiState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> ApiResult<Json<Envelope<MeasurementSeries>>> {
    let identity = authorize_read(&state, &headers).await?;
    let settings = &state.settings;

    let query =
        MeasurementsQuery::from_params(&QueryParams::from_raw(uri.query()), &settings.limits)?;
    let series = call_repository(
        settings,
        state
            .repository
            .measurement_list(&identity.tenant_id, &settings.region, &query),
    )
    .await?;

    Ok(Json(paginate_measurements(
        series,
        &settings.request_uri(&uri),
        query.limit,
    )))
}

/// GET /v2.0/metrics/statistics
#[instrument(skip_all)]
pub async fn list_statistics(
    State(state): State<ApiState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> ApiResult<Json<Envelope<StatisticsSeries>>> {
    let identity = authorize_read(&state, &headers).await?;
    let settings = &state.settings;

    let query =
        StatisticsQuery::from_params(&QueryParams::from_raw(uri.query()), &settings.limits)?;
    let series = call_repository(
        settings,
        state
            .repository
            .metrics_statistics(&identity.tenant_id, &settings.region, &query),
    )
    .await?;

    Ok(Json(paginate_statistics(
        series,
        &settings.request_uri(&uri),
        query.limit,
    )))
}

async fn authorize_read(state: &ApiState, headers: &HeaderMap) -> ApiResult<Identity> {
    let identity = state
        .authorizer
        .authorize(headers, &state.settings.roles.read_roles())
        .await?;
    Ok(identity)
}

/// Await a repository call, bounded by the configured timeout
async fn call_repository<T>(
    settings: &ApiSettings,
    call: impl Future<Output = RepositoryResult<T>>,
) -> ApiResult<T> {
    match timeout(settings.repository_timeout, call).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(RepositoryError::Timeout(settings.repository_timeout.as_secs()).into()),
    }
}

fn require_json(headers: &HeaderMap) -> ApiResult<()> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let essence = content_type.split(';').next().unwrap_or_default().trim();
    if essence.eq_ignore_ascii_case("application/json") {
        Ok(())
    } else {
        Err(ApiError::bad_input(
            "Content-Type",
            "request body must be application/json",
        ))
    }
}
