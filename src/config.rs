use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::Deserialize;
use tracing::trace;

use crate::query::{DEFAULT_LIMIT, MAX_LIMIT, PageLimits};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Region stamped on every ingested metric
    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default)]
    pub security: RoleSets,

    #[serde(default)]
    pub pagination: PaginationConfig,

    /// Queue configuration (optional - defaults to in-memory)
    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Value of the `Retry-After` header sent when the queue is unavailable
    #[serde(default = "default_retry_after_secs")]
    pub retry_after_secs: u64,

    /// Scheme and authority prefixed to generated links, e.g. `https://metrics.example.com`
    pub public_url: Option<String>,

    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            region: default_region(),
            security: RoleSets::default(),
            pagination: PaginationConfig::default(),
            queue: QueueConfig::default(),
            timeouts: TimeoutConfig::default(),
            retry_after_secs: default_retry_after_secs(),
            public_url: None,
            enable_cors: default_enable_cors(),
        }
    }
}

/// Role sets of the operations, fixed at startup
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoleSets {
    /// Roles allowed to read and write metrics
    #[serde(default = "default_authorized_roles", rename = "default_authorized_roles")]
    pub default: Vec<String>,

    /// Additional roles allowed to write metrics only
    #[serde(default = "agent_authorized_roles", rename = "agent_authorized_roles")]
    pub agent: Vec<String>,

    /// Roles allowed to write metrics on behalf of another tenant
    #[serde(default = "delegate_authorized_roles", rename = "delegate_authorized_roles")]
    pub delegate: Vec<String>,
}

impl Default for RoleSets {
    fn default() -> Self {
        Self {
            default: default_authorized_roles(),
            agent: agent_authorized_roles(),
            delegate: delegate_authorized_roles(),
        }
    }
}

impl RoleSets {
    pub fn read_roles(&self) -> Vec<String> {
        self.default.clone()
    }

    pub fn write_roles(&self) -> Vec<String> {
        self.default.iter().chain(&self.agent).cloned().collect()
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PaginationConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    #[serde(default = "max_limit")]
    pub max_limit: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
        }
    }
}

impl PaginationConfig {
    /// Page limits with the default never exceeding the maximum
    pub fn limits(&self) -> PageLimits {
        let max = self.max_limit.max(1);
        PageLimits {
            default: self.default_limit.clamp(1, max),
            max,
        }
    }
}

/// Message queue configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum QueueConfig {
    /// Bounded in-process queue drained into the in-memory repository
    Memory {
        /// Batches buffered before publishing fails
        #[serde(default = "default_queue_capacity")]
        capacity: usize,
    },

    /// Forward batches to a remote collector over HTTP
    Http {
        url: String,

        #[serde(default = "default_http_timeout_secs")]
        timeout_secs: u64,
    },
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig::Memory {
            capacity: default_queue_capacity(),
        }
    }
}

/// Upper bounds on collaborator calls made while serving a request
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_queue_timeout_secs")]
    pub queue_secs: u64,

    #[serde(default = "default_repository_timeout_secs")]
    pub repository_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            queue_secs: default_queue_timeout_secs(),
            repository_secs: default_repository_timeout_secs(),
        }
    }
}

impl TimeoutConfig {
    pub fn queue(&self) -> Duration {
        Duration::from_secs(self.queue_secs)
    }

    pub fn repository(&self) -> Duration {
        Duration::from_secs(self.repository_secs)
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, crate::util::DEFAULT_PORT))
}

fn default_region() -> String {
    "useast".to_string()
}

fn default_authorized_roles() -> Vec<String> {
    vec!["admin".to_string(), "monasca-user".to_string()]
}

fn agent_authorized_roles() -> Vec<String> {
    vec!["monasca-agent".to_string()]
}

fn delegate_authorized_roles() -> Vec<String> {
    vec!["admin".to_string()]
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

fn max_limit() -> usize {
    MAX_LIMIT
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_http_timeout_secs() -> u64 {
    5
}

fn default_queue_timeout_secs() -> u64 {
    10
}

fn default_repository_timeout_secs() -> u64 {
    30
}

fn default_retry_after_secs() -> u64 {
    60
}

fn default_enable_cors() -> bool {
    true
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
