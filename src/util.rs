use std::net::SocketAddr;

use crate::config::Config;

pub const DEFAULT_PORT: u16 = 8070;

const METRICS_API_ADDR: &str = "METRICS_API_ADDR";

const METRICS_API_REGION: &str = "METRICS_API_REGION";

pub fn get_addr() -> Option<SocketAddr> {
    let addr_from_env = std::env::var(METRICS_API_ADDR);
    addr_from_env.ok().and_then(|res| res.parse().ok())
}

pub fn get_region() -> Option<String> {
    std::env::var(METRICS_API_REGION)
        .ok()
        .filter(|region| !region.trim().is_empty())
}

/// Apply environment overrides on top of a loaded configuration
pub fn apply_env_overrides(mut config: Config) -> Config {
    if let Some(addr) = get_addr() {
        config.bind_addr = addr;
    }
    if let Some(region) = get_region() {
        config.region = region;
    }
    config
}
