//! Integration tests for collaborator failures
//!
//! These tests verify that:
//! - Queue failures surface as 503 with a retry hint
//! - Repository failures surface as 503 without leaking detail
//! - Nothing is published when input is rejected

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;

use crate::helpers::{as_caller, metric_json, spawn_with};
use metrics_api::{
    api::ErrorBody,
    query::{ListMetricsQuery, ListNamesQuery, MeasurementsQuery, StatisticsQuery},
    queue::{MemoryQueue, MessageQueue, QueueError},
    repository::{
        MemoryRepository, MetricsRepository, RepositoryError, RepositoryResult,
        schema::{MeasurementSeries, MetricDefinition, MetricName, StatisticsSeries},
    },
    transform::TransformedMetric,
};

struct UnreachableQueue;

#[async_trait]
impl MessageQueue for UnreachableQueue {
    async fn send_batch(&self, _batch: Vec<TransformedMetric>) -> Result<(), QueueError> {
        Err(QueueError::Transport("connection refused".to_string()))
    }
}

/// Never answers within the test timeouts
struct HangingRepository;

#[async_trait]
impl MetricsRepository for HangingRepository {
    async fn list_metrics(
        &self,
        _: &str,
        _: &str,
        _: &ListMetricsQuery,
    ) -> RepositoryResult<Vec<MetricDefinition>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Vec::new())
    }

    async fn list_metric_names(
        &self,
        _: &str,
        _: &str,
        _: &ListNamesQuery,
    ) -> RepositoryResult<Vec<MetricName>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Vec::new())
    }

    async fn measurement_list(
        &self,
        _: &str,
        _: &str,
        _: &MeasurementsQuery,
    ) -> RepositoryResult<Vec<MeasurementSeries>> {
        Err(RepositoryError::QueryFailed("table metrics_v2 missing".to_string()))
    }

    async fn metrics_statistics(
        &self,
        _: &str,
        _: &str,
        _: &StatisticsQuery,
    ) -> RepositoryResult<Vec<StatisticsSeries>> {
        Err(RepositoryError::Unavailable("no route to host".to_string()))
    }
}

#[tokio::test]
async fn test_queue_transport_failure_returns_retry_hint() {
    let addr = spawn_with(Arc::new(UnreachableQueue), Arc::new(MemoryRepository::new())).await;
    let client = reqwest::Client::new();

    let response = as_caller(client.post(format!("http://{addr}/v2.0/metrics")), "t", "admin")
        .json(&metric_json("cpu.idle", "a", 0, 1.0))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        response.headers().get("retry-after").unwrap().to_str().unwrap(),
        "60"
    );

    let body: ErrorBody = response.json().await.unwrap();
    assert_eq!(body.error.code, 503);
    assert!(!body.error.message.contains("refused"));
}

#[tokio::test]
async fn test_closed_memory_queue_is_unavailable() {
    let (queue, batches) = MemoryQueue::channel(1);
    drop(batches);
    let addr = spawn_with(Arc::new(queue), Arc::new(MemoryRepository::new())).await;
    let client = reqwest::Client::new();

    let response = as_caller(client.post(format!("http://{addr}/v2.0/metrics")), "t", "admin")
        .json(&metric_json("cpu.idle", "a", 0, 1.0))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_full_memory_queue_is_unavailable() {
    let (queue, _batches) = MemoryQueue::channel(1);
    let addr = spawn_with(Arc::new(queue), Arc::new(MemoryRepository::new())).await;
    let client = reqwest::Client::new();
    let url = format!("http://{addr}/v2.0/metrics");

    let first = as_caller(client.post(&url), "t", "admin")
        .json(&metric_json("cpu.idle", "a", 0, 1.0))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::NO_CONTENT);

    let second = as_caller(client.post(&url), "t", "admin")
        .json(&metric_json("cpu.idle", "a", 1, 1.0))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_invalid_batch_publishes_nothing() {
    let (queue, mut batches) = MemoryQueue::channel(4);
    let addr = spawn_with(Arc::new(queue), Arc::new(MemoryRepository::new())).await;
    let client = reqwest::Client::new();

    let batch = json!([
        metric_json("cpu.idle", "a", 0, 1.0),
        {"name": "cpu.idle", "timestamp": 1, "value": 1, "dimensions": {"host": "h".repeat(256)}},
    ]);
    let response = as_caller(client.post(format!("http://{addr}/v2.0/metrics")), "t", "admin")
        .json(&batch)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorBody = response.json().await.unwrap();
    assert_eq!(body.error.field.as_deref(), Some("dimensions"));
    assert_eq!(body.error.index, Some(1));
    assert!(batches.try_recv().is_err());
}

#[tokio::test]
async fn test_repository_timeout_is_unavailable() {
    let addr = spawn_with(Arc::new(UnreachableQueue), Arc::new(HangingRepository)).await;
    let client = reqwest::Client::new();

    let response = as_caller(client.get(format!("http://{addr}/v2.0/metrics/names")), "t", "admin")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_repository_errors_hide_detail() {
    let addr = spawn_with(Arc::new(UnreachableQueue), Arc::new(HangingRepository)).await;
    let client = reqwest::Client::new();

    for path in [
        "/v2.0/metrics/measurements?name=cpu.idle&start_time=0",
        "/v2.0/metrics/statistics?name=cpu.idle&start_time=0&statistics=avg&period=60",
    ] {
        let response = as_caller(client.get(format!("http://{addr}{path}")), "t", "admin")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body: ErrorBody = response.json().await.unwrap();
        assert!(!body.error.message.contains("metrics_v2"));
        assert!(!body.error.message.contains("route"));
    }
}

#[tokio::test]
async fn test_forbidden_roles() {
    let addr = spawn_with(Arc::new(UnreachableQueue), Arc::new(MemoryRepository::new())).await;
    let client = reqwest::Client::new();

    let response = as_caller(client.get(format!("http://{addr}/v2.0/metrics")), "t", "guest")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body: ErrorBody = response.json().await.unwrap();
    assert_eq!(body.error.code, 403);
}
