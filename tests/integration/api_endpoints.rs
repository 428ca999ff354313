//! Integration tests for API endpoints
//!
//! These tests drive a real server over HTTP and verify that:
//! - Accepted metrics flow through the queue into the repository
//! - Every read endpoint returns the documented envelope
//! - Pagination links can be followed to exhaustion
//! - Input errors name the offending field

use reqwest::StatusCode;
use serde_json::{Value, json};

use crate::helpers::{START, TestServer, as_caller, metric_json, next_link, spawn_memory_server};
use metrics_api::api::{ErrorBody, HealthResponse};

#[tokio::test]
async fn test_health_endpoint() {
    let server = spawn_memory_server().await;

    let response = server
        .client
        .get(server.url("/healthcheck"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let health: HealthResponse = response.json().await.unwrap();
    assert_eq!(health.status, "ok");
}

#[tokio::test]
async fn test_posted_metric_becomes_queryable() {
    let server = spawn_memory_server().await;

    let metric = json!({
        "name": "cpu.idle",
        "timestamp": 1234567890,
        "value": 98.5,
        "dimensions": {"host": "a"}
    });
    let response = server
        .post("/v2.0/metrics", "monasca-agent", &metric)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    server.wait_for_stored(1).await;

    let body: Value = server
        .get("/v2.0/metrics?name=cpu.idle")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let elements = body["elements"].as_array().unwrap();
    assert_eq!(elements.len(), 1);
    assert_eq!(elements[0]["name"], "cpu.idle");
    assert_eq!(elements[0]["dimensions"], json!({"host": "a"}));
    assert!(elements[0]["id"].as_str().is_some_and(|id| !id.is_empty()));

    let body: Value = server
        .get("/v2.0/metrics/measurements?name=cpu.idle&start_time=2009-02-13T23:31:30Z")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        body["elements"][0]["measurements"],
        json!([["2009-02-13T23:31:30.000Z", 98.5, {}]])
    );
}

#[tokio::test]
async fn test_oversized_name_is_rejected() {
    let server = spawn_memory_server().await;

    let metric = metric_json(&"x".repeat(65), "a", 0, 1.0);
    let response = server
        .post("/v2.0/metrics", "monasca-user", &metric)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: ErrorBody = response.json().await.unwrap();
    assert_eq!(body.error.code, 400);
    assert_eq!(body.error.field.as_deref(), Some("name"));
    assert_eq!(body.error.index, Some(0));

    let stats = server.persister.get_stats().await.unwrap();
    assert_eq!(stats.batches, 0);
}

#[tokio::test]
async fn test_measurement_pagination() {
    let server = spawn_memory_server().await;

    let batch = json!([
        metric_json("cpu.idle", "a", 0, 1.0),
        metric_json("cpu.idle", "a", 60, 2.0),
    ]);
    server
        .post("/v2.0/metrics/", "monasca-user", &batch)
        .send()
        .await
        .unwrap();
    server.wait_for_stored(2).await;

    let query = format!("/v2.0/metrics/measurements?name=cpu.idle&start_time={START}");

    let full: Value = server
        .get(&format!("{query}&limit=2"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(next_link(&full).is_some());

    let partial: Value = server
        .get(&format!("{query}&limit=3"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(next_link(&partial).is_none());
    assert_eq!(
        partial["elements"][0]["measurements"]
            .as_array()
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test]
async fn test_following_next_links_visits_every_row_once() {
    let server = spawn_memory_server().await;

    let batch: Vec<Value> = (0..7)
        .map(|i| metric_json("mem.free", if i % 2 == 0 { "a" } else { "b" }, i * 10, i as f64))
        .collect();
    server
        .post("/v2.0/metrics", "admin", &Value::Array(batch))
        .send()
        .await
        .unwrap();
    server.wait_for_stored(7).await;

    let mut values = Vec::new();
    let mut next = Some(format!(
        "/v2.0/metrics/measurements?name=mem.free&start_time={START}&limit=3&merge_metrics=true"
    ));
    let mut pages = 0;

    while let Some(path) = next {
        let page: Value = server.get(&path).send().await.unwrap().json().await.unwrap();
        for series in page["elements"].as_array().unwrap() {
            for row in series["measurements"].as_array().unwrap() {
                values.push(row[1].as_f64().unwrap());
            }
        }
        next = next_link(&page);
        pages += 1;
        assert!(pages <= 4, "pagination did not terminate");
    }

    assert_eq!(values, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
}

/// Follow `next` links from `path` and collect every returned value
async fn walk_values(server: &TestServer, path: String) -> Vec<f64> {
    let mut values = Vec::new();
    let mut next = Some(path);
    let mut pages = 0;

    while let Some(path) = next {
        let page: Value = server.get(&path).send().await.unwrap().json().await.unwrap();
        for series in page["elements"].as_array().unwrap() {
            for row in series["measurements"].as_array().unwrap() {
                values.push(row[1].as_f64().unwrap());
            }
        }
        next = next_link(&page);
        pages += 1;
        assert!(pages <= 10, "pagination of {path} did not terminate");
    }

    values.sort_by(f64::total_cmp);
    values
}

#[tokio::test]
async fn test_next_links_cover_tied_and_sub_millisecond_rows() {
    let server = spawn_memory_server().await;

    let mut batch: Vec<Value> = [("a", 100, 1.0), ("b", 100, 2.0), ("a", 160, 3.0), ("b", 160, 4.0)]
        .into_iter()
        .map(|(host, offset, value)| metric_json("cpu.tied", host, offset, value))
        .collect();
    batch.extend((1..=3).map(|i| {
        json!({
            "name": "cpu.fine",
            "timestamp": START as f64 + 100.0 + i as f64 * 0.0001,
            "value": i as f64,
            "dimensions": {"host": "a"}
        })
    }));
    server
        .post("/v2.0/metrics", "admin", &Value::Array(batch))
        .send()
        .await
        .unwrap();
    server.wait_for_stored(7).await;

    for merge in [false, true] {
        let path = format!(
            "/v2.0/metrics/measurements?name=cpu.tied&start_time={START}&limit=1&merge_metrics={merge}"
        );
        assert_eq!(walk_values(&server, path).await, vec![1.0, 2.0, 3.0, 4.0]);
    }

    let path = format!("/v2.0/metrics/measurements?name=cpu.fine&start_time={START}&limit=1");
    assert_eq!(walk_values(&server, path).await, vec![1.0, 2.0, 3.0]);
}

#[tokio::test]
async fn test_names_and_dimension_filters() {
    let server = spawn_memory_server().await;

    let batch = json!([
        metric_json("cpu.idle", "a", 0, 1.0),
        metric_json("disk.used", "b", 0, 1.0),
        metric_json("mem.free", "a", 0, 1.0),
    ]);
    server
        .post("/v2.0/metrics", "admin", &batch)
        .send()
        .await
        .unwrap();
    server.wait_for_stored(3).await;

    let body: Value = server
        .get("/v2.0/metrics/names?dimensions=host:a")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        body["elements"],
        json!([{"name": "cpu.idle"}, {"name": "mem.free"}])
    );

    let body: Value = server
        .get("/v2.0/metrics/names?limit=1")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        next_link(&body).as_deref(),
        Some("/v2.0/metrics/names?limit=1&offset=cpu.idle")
    );
}

#[tokio::test]
async fn test_statistics_endpoint() {
    let server = spawn_memory_server().await;

    let batch = json!([
        metric_json("cpu.idle", "a", 0, 10.0),
        metric_json("cpu.idle", "a", 30, 20.0),
        metric_json("cpu.idle", "a", 70, 60.0),
    ]);
    server
        .post("/v2.0/metrics", "admin", &batch)
        .send()
        .await
        .unwrap();
    server.wait_for_stored(3).await;

    let body: Value = server
        .get(&format!(
            "/v2.0/metrics/statistics?name=cpu.idle&start_time={START}&statistics=COUNT,avg&period=60"
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let series = &body["elements"][0];
    assert_eq!(series["columns"], json!(["timestamp", "avg", "count"]));
    assert_eq!(
        series["statistics"],
        json!([
            ["2020-01-01T00:00:00.000Z", 15.0, 2.0],
            ["2020-01-01T00:01:00.000Z", 60.0, 1.0]
        ])
    );
}

#[tokio::test]
async fn test_statistics_without_statistics_param() {
    let server = spawn_memory_server().await;

    let response = server
        .get("/v2.0/metrics/statistics?name=x&period=60")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: ErrorBody = response.json().await.unwrap();
    assert_eq!(body.error.field.as_deref(), Some("statistics"));
}

#[tokio::test]
async fn test_measurements_require_start_time() {
    let server = spawn_memory_server().await;

    let response = server
        .get("/v2.0/metrics/measurements?name=cpu.idle")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: ErrorBody = response.json().await.unwrap();
    assert_eq!(body.error.field.as_deref(), Some("start_time"));
}

#[tokio::test]
async fn test_delegated_write_lands_in_other_tenant() {
    let server = spawn_memory_server().await;

    let response = server
        .post(
            "/v2.0/metrics?tenant_id=tenant-2",
            "admin",
            &metric_json("cpu.idle", "a", 0, 1.0),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    server.wait_for_stored(1).await;

    let own: Value = server
        .get("/v2.0/metrics")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(own["elements"], json!([]));

    let other: Value = as_caller(server.client.get(server.url("/v2.0/metrics")), "tenant-2", "monasca-user")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(other["elements"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let server = spawn_memory_server().await;

    let response = server
        .client
        .get(server.url("/v2.0/metrics"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
