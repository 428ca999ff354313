//! Integration tests for concurrent requests
//!
//! Handlers share nothing but immutable settings and the collaborators, so
//! concurrent writers and readers must neither lose nor mix up data.

use futures::future::join_all;
use reqwest::StatusCode;
use serde_json::{Value, json};

use crate::helpers::{START, as_caller, metric_json, spawn_memory_server};

#[tokio::test]
async fn test_concurrent_posts_are_all_stored() {
    let server = spawn_memory_server().await;

    let requests = (0..20).map(|i| {
        let batch = json!([
            metric_json("cpu.idle", "a", i * 2, i as f64),
            metric_json("cpu.idle", "b", i * 2 + 1, i as f64),
        ]);
        let request = server.post("/v2.0/metrics", "monasca-agent", &batch).send();
        async move { request.await.unwrap().status() }
    });

    let statuses = join_all(requests).await;
    assert!(statuses.iter().all(|status| *status == StatusCode::NO_CONTENT));

    let stats = server.wait_for_stored(40).await;
    assert_eq!(stats.batches, 20);

    let body: Value = server
        .get(&format!("/v2.0/metrics/measurements?name=cpu.idle&start_time={START}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let rows: usize = body["elements"]
        .as_array()
        .unwrap()
        .iter()
        .map(|series| series["measurements"].as_array().unwrap().len())
        .sum();
    assert_eq!(rows, 40);
}

#[tokio::test]
async fn test_concurrent_tenants_stay_isolated() {
    let server = spawn_memory_server().await;

    let writes = (0..5).map(|i| {
        let tenant = format!("tenant-{i}");
        let request = as_caller(server.client.post(server.url("/v2.0/metrics")), &tenant, "admin")
            .json(&metric_json(&format!("metric.{i}"), "a", 0, 1.0))
            .send();
        async move { request.await.unwrap().status() }
    });
    let statuses = join_all(writes).await;
    assert!(statuses.iter().all(|status| *status == StatusCode::NO_CONTENT));
    server.wait_for_stored(5).await;

    let reads = (0..5).map(|i| {
        let tenant = format!("tenant-{i}");
        let request = as_caller(server.client.get(server.url("/v2.0/metrics/names")), &tenant, "admin")
            .send();
        async move { request.await.unwrap().json::<Value>().await.unwrap() }
    });

    for (i, body) in join_all(reads).await.into_iter().enumerate() {
        assert_eq!(body["elements"], json!([{"name": format!("metric.{i}")}]));
    }
}
