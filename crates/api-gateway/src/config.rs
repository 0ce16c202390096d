//! Configuration types and loading logic.

use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use gateway_tracing::TracingConfig;
use serde::Deserialize;

/// Top-level gateway configuration.
///
/// Every section has defaults, so the gateway starts without a config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub tracing: TracingConfig,
}

/// Server listen configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Largest inbound request body the gateway buffers before forwarding.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Base URLs of the backend services, in registration order.
#[derive(Debug, Clone, Deserialize)]
pub struct ServicesConfig {
    #[serde(default = "default_comment_service_url")]
    pub comment_service_url: String,

    #[serde(default = "default_member_service_url")]
    pub member_service_url: String,
}

/// Outbound call limits shared by proxying and schema fetches.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Whole-request timeout for one backend call. `0` disables it.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Timeout for establishing the TCP/TLS connection. `0` disables it.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Option<Duration> {
        non_zero_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.connect_timeout_secs)
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn default_listen_address() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_comment_service_url() -> String {
    "http://comment-service:8000".to_string()
}

fn default_member_service_url() -> String {
    "http://member-service:8000".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            comment_service_url: default_comment_service_url(),
            member_service_url: default_member_service_url(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from TOML file and environment variables.
    ///
    /// Priority (highest to lowest):
    /// 1. `COMMENT_SERVICE_URL` / `MEMBER_SERVICE_URL`
    /// 2. Environment variables (GATEWAY_ prefix, __ for nesting)
    /// 3. TOML config file (a missing file is not an error)
    /// 4. Defaults
    pub fn load(config_path: &str) -> anyhow::Result<Self> {
        let mut config: GatewayConfig = Figment::new()
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("GATEWAY_").split("__"))
            .extract()?;

        // The backends are conventionally wired with these plain names
        if let Ok(url) = std::env::var("COMMENT_SERVICE_URL") {
            config.services.comment_service_url = url;
        }
        if let Ok(url) = std::env::var("MEMBER_SERVICE_URL") {
            config.services.member_service_url = url;
        }

        Ok(config)
    }
}
