//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Listener, body limit and shutdown settings.
    pub server: ServerConfig,

    /// Outbound connection pool settings.
    pub upstream: UpstreamConfig,

    /// Forwarding buffer sizes.
    pub stream: StreamConfig,

    /// Route definitions, matched in declaration order.
    pub routes: Vec<RouteConfig>,

    /// Per-tenant rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Inbound API keys.
    pub auth: AuthConfig,

    /// Audit record sinks.
    pub storage: StorageConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Total time allowed for one upstream exchange, in seconds.
    pub request_timeout_secs: u64,

    /// Maximum inbound request body, in bytes.
    pub max_body_size: usize,

    /// How long in-flight streams may keep running after shutdown starts.
    pub shutdown_grace_secs: u64,
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 300,
            max_body_size: 10 * 1024 * 1024,
            shutdown_grace_secs: 30,
        }
    }
}

/// Outbound HTTP client pool.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Idle connections kept per upstream host.
    pub pool_max_idle_per_host: usize,

    /// Idle connection lifetime in seconds.
    pub pool_idle_timeout_secs: u64,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            pool_max_idle_per_host: 10,
            pool_idle_timeout_secs: 90,
            connect_timeout_secs: 10,
        }
    }
}

/// Forwarding buffer sizes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Read buffer for raw-binary streams, in bytes.
    pub raw_chunk_size: usize,

    /// Longest accepted line in a line-events stream, in bytes.
    pub max_line_bytes: usize,

    /// Frames queued between a forwarder and the client connection.
    pub channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            raw_chunk_size: 32 * 1024,
            max_line_bytes: 1024 * 1024,
            channel_capacity: 16,
        }
    }
}

/// How an upstream delivers its response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum StreamKind {
    /// Newline-delimited events (SSE, NDJSON).
    #[serde(rename = "sse", alias = "line-events")]
    Sse,
    /// Undifferentiated bytes (audio, files).
    #[serde(rename = "raw", alias = "raw-binary")]
    Raw,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Sse => "sse",
            StreamKind::Raw => "raw",
        }
    }
}

/// Route configuration mapping a path prefix to an upstream.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Path prefix to match.
    pub path: String,

    /// Upstream base URL; the inbound path is appended to it.
    pub upstream: String,

    /// Header that carries the upstream credential.
    #[serde(default)]
    pub auth_header: Option<String>,

    /// Environment variable holding the upstream credential.
    #[serde(default)]
    pub auth_env: Option<String>,

    /// Stream kind of the upstream response.
    pub kind: StreamKind,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Sustained requests per minute per tenant.
    #[serde(alias = "default")]
    pub requests_per_minute: u32,

    /// Burst capacity.
    pub burst: u32,

    /// Buckets idle this long are reclaimed, in seconds.
    pub idle_ttl_secs: u64,

    /// Interval between reclamation sweeps, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_minute: 60,
            burst: 10,
            idle_ttl_secs: 3600,
            sweep_interval_secs: 60,
        }
    }
}

/// Inbound authentication.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Accepted bearer keys.
    pub api_keys: Vec<String>,
}

/// Audit persistence configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Emit a summary log line per request.
    pub log_summary: bool,

    /// Append full records as JSON lines to this file.
    pub jsonl_path: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            log_summary: true,
            jsonl_path: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable the metrics scrape endpoint.
    pub metrics_enabled: bool,

    /// Path of the metrics scrape endpoint.
    pub metrics_path: String,

    /// Log output settings.
    pub logging: LoggingConfig,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            metrics_path: "/metrics".to_string(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Console log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Log output settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Console format.
    pub format: LogFormat,

    /// Directory for the JSON log file; console only when unset.
    pub directory: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            directory: None,
        }
    }
}
