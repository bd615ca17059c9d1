//! Configuration data types.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Global settings
    #[serde(default)]
    pub global: GlobalConfig,

    /// HTTP front end settings
    #[serde(default)]
    pub frontend: FrontendConfig,

    /// Backend pool and assignment strategy
    #[serde(default)]
    pub balancer: BalancerConfig,
}

/// Global configuration settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: json, pretty or compact
    #[serde(default)]
    pub log_format: LogFormat,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
    Compact,
}

/// Metrics endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Whether metrics endpoint is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Address to bind metrics server
    #[serde(default = "default_metrics_address")]
    pub address: SocketAddr,

    /// Path for metrics endpoint
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: default_metrics_address(),
            path: default_metrics_path(),
        }
    }
}

/// HTTP front end configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FrontendConfig {
    /// Address and port to listen on
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Request header carrying the session id
    #[serde(default = "default_session_header")]
    pub session_header: String,

    /// How long a client may take to send request headers
    #[serde(default = "default_header_read_timeout", with = "humantime_serde")]
    pub header_read_timeout: Duration,

    /// Control endpoint that registers a backend
    #[serde(default = "default_register_path")]
    pub register_path: String,

    /// Control endpoint that deregisters a backend
    #[serde(default = "default_unregister_path")]
    pub unregister_path: String,

    /// Control endpoint that ends a session
    #[serde(default = "default_end_session_path")]
    pub end_session_path: String,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            session_header: default_session_header(),
            header_read_timeout: default_header_read_timeout(),
            register_path: default_register_path(),
            unregister_path: default_unregister_path(),
            end_session_path: default_end_session_path(),
        }
    }
}

/// Backend pool configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BalancerConfig {
    /// Strategy for assigning new sessions
    #[serde(default)]
    pub algorithm: Algorithm,

    /// Backends registered at startup
    #[serde(default)]
    pub servers: Vec<SocketAddr>,
}

/// Session assignment algorithm.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    #[default]
    LeastConnections,
    RoundRobin,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_metrics_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9090))
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8000))
}

fn default_session_header() -> String {
    "room-id".to_string()
}

fn default_header_read_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_register_path() -> String {
    "/register".to_string()
}

fn default_unregister_path() -> String {
    "/unregister".to_string()
}

fn default_end_session_path() -> String {
    "/end-session".to_string()
}

/// Custom serde module for humantime durations.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&humantime::format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
