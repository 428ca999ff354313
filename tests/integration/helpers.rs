//! Helper functions for integration tests

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use metrics_api::{
    actors::{messages::PersisterStats, persister::PersisterHandle},
    api::{ApiConfig, ApiSettings, ApiState, middleware::HeaderAuthorizer, spawn_api_server},
    queue::{MemoryQueue, MessageQueue},
    repository::{MemoryRepository, MetricsRepository},
};
use serde_json::{Value, json};

/// 2020-01-01T00:00:00Z
pub const START: i64 = 1_577_836_800;

/// A running API server backed by the in-memory queue and repository
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    pub persister: PersisterHandle,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn post(&self, path: &str, roles: &str, body: &Value) -> reqwest::RequestBuilder {
        as_caller(self.client.post(self.url(path)), "tenant-1", roles).json(body)
    }

    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        as_caller(self.client.get(self.url(path)), "tenant-1", "monasca-user")
    }

    /// Wait until the persister has stored at least `expected` metrics
    pub async fn wait_for_stored(&self, expected: u64) -> PersisterStats {
        for _ in 0..100 {
            if let Some(stats) = self.persister.get_stats().await {
                if stats.metrics_stored >= expected {
                    return stats;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("persister did not store {expected} metrics in time");
    }
}

pub fn as_caller(
    request: reqwest::RequestBuilder,
    tenant: &str,
    roles: &str,
) -> reqwest::RequestBuilder {
    request.header("X-Tenant-Id", tenant).header("X-Roles", roles)
}

pub fn test_settings() -> ApiSettings {
    ApiSettings {
        queue_timeout: Duration::from_millis(500),
        repository_timeout: Duration::from_millis(500),
        ..ApiSettings::default()
    }
}

pub fn test_config() -> ApiConfig {
    ApiConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(), // Random port
        enable_cors: true,
    }
}

/// Spawn the full in-process pipeline: API, memory queue, persister, repository
pub async fn spawn_memory_server() -> TestServer {
    let repository = Arc::new(MemoryRepository::new());
    let (queue, batches) = MemoryQueue::channel(64);
    let persister = PersisterHandle::spawn(repository.clone(), batches);

    let state = ApiState::new(
        Arc::new(HeaderAuthorizer),
        Arc::new(queue),
        repository,
        test_settings(),
    );
    let addr = spawn_api_server(test_config(), state).await.unwrap();

    TestServer {
        addr,
        client: reqwest::Client::new(),
        persister,
    }
}

/// Spawn an API server over arbitrary collaborators
pub async fn spawn_with(
    queue: Arc<dyn MessageQueue>,
    repository: Arc<dyn MetricsRepository>,
) -> SocketAddr {
    let state = ApiState::new(Arc::new(HeaderAuthorizer), queue, repository, test_settings());
    spawn_api_server(test_config(), state).await.unwrap()
}

pub fn metric_json(name: &str, host: &str, offset_secs: i64, value: f64) -> Value {
    json!({
        "name": name,
        "timestamp": START + offset_secs,
        "value": value,
        "dimensions": {"host": host}
    })
}

/// The `next` link of an envelope, if any
pub fn next_link(envelope: &Value) -> Option<String> {
    envelope["links"]
        .as_array()?
        .iter()
        .find(|link| link["rel"] == "next")
        .and_then(|link| link["href"].as_str())
        .map(String::from)
}
