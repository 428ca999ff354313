//! REST API for metrics ingestion and queries
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - **Collaborators** (authorizer, message queue, repository) injected as
//!   trait objects through [`ApiState`]
//!
//! ## Endpoints
//!
//! - `POST /v2.0/metrics` - Submit one metric or a batch
//! - `GET /v2.0/metrics` - List metric definitions
//! - `GET /v2.0/metrics/names` - List metric names
//! - `GET /v2.0/metrics/measurements` - Raw measurements
//! - `GET /v2.0/metrics/statistics` - Period-bucketed statistics
//! - `GET /healthcheck` - Health check
//!
//! The metrics collection answers with and without a trailing slash.

#[cfg(feature = "api")]
pub mod error;
#[cfg(feature = "api")]
pub mod middleware;
#[cfg(feature = "api")]
pub mod routes;
#[cfg(feature = "api")]
pub mod state;
#[cfg(feature = "api")]
pub mod types;

#[cfg(feature = "api")]
pub use error::{ApiError, ApiResult};
#[cfg(feature = "api")]
pub use state::{ApiSettings, ApiState};
#[cfg(feature = "api")]
pub use types::{ErrorBody, ErrorDetail, HealthResponse};

#[cfg(feature = "api")]
use axum::{Router, routing::get};
use std::net::SocketAddr;
use tracing::info;

use crate::config::Config;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8070")
    pub bind_addr: SocketAddr,

    /// Enable CORS for browser clients
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ApiConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            bind_addr: config.bind_addr,
            enable_cors: config.enable_cors,
        }
    }
}

/// Build the router serving every endpoint
#[cfg(feature = "api")]
pub fn router(state: ApiState) -> Router {
    use routes::{health, metrics};

    let collection = get(metrics::list_metrics).post(metrics::post_metrics);

    Router::new()
        .route("/v2.0/metrics", collection.clone())
        .route("/v2.0/metrics/", collection)
        .route("/v2.0/metrics/names", get(metrics::list_metric_names))
        .route("/v2.0/metrics/measurements", get(metrics::list_measurements))
        .route("/v2.0/metrics/statistics", get(metrics::list_statistics))
        .route("/healthcheck", get(health::health_check))
        .with_state(state)
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
#[cfg(feature = "api")]
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    info!("starting API server on {}", config.bind_addr);

    let mut app = router(state).layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    // Bind and serve
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
