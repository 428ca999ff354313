//! API shared state

use std::sync::Arc;
use std::time::Duration;

use axum::http::Uri;

use crate::api::middleware::{Authorizer, RoleSets};
use crate::config::Config;
use crate::query::PageLimits;
use crate::queue::MessageQueue;
use crate::repository::MetricsRepository;

/// Immutable settings consulted by the handlers
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub region: String,
    pub roles: RoleSets,
    pub limits: PageLimits,
    pub queue_timeout: Duration,
    pub repository_timeout: Duration,
    pub retry_after_secs: u64,

    /// Prefix of generated links; links are relative when unset
    pub public_url: Option<String>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ApiSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            region: config.region.clone(),
            roles: config.security.clone(),
            limits: config.pagination.limits(),
            queue_timeout: config.timeouts.queue(),
            repository_timeout: config.timeouts.repository(),
            retry_after_secs: config.retry_after_secs,
            public_url: config.public_url.clone(),
        }
    }

    /// The request URI as it appears in `self` and `next` links
    pub fn request_uri(&self, uri: &Uri) -> String {
        let path_and_query = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| uri.path());

        match &self.public_url {
            Some(base) => format!("{}{path_and_query}", base.trim_end_matches('/')),
            None => path_and_query.to_string(),
        }
    }
}

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    pub authorizer: Arc<dyn Authorizer>,
    pub queue: Arc<dyn MessageQueue>,
    pub repository: Arc<dyn MetricsRepository>,
    pub settings: Arc<ApiSettings>,
}

impl ApiState {
    pub fn new(
        authorizer: Arc<dyn Authorizer>,
        queue: Arc<dyn MessageQueue>,
        repository: Arc<dyn MetricsRepository>,
        settings: ApiSettings,
    ) -> Self {
        Self {
            authorizer,
            queue,
            repository,
            settings: Arc::new(settings),
        }
    }
}
