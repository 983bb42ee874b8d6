//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! reproduction. All types derive Serde traits for deserialization from
//! config files, and every field has a default so a minimal file (or no
//! file at all) is valid.

use serde::{Deserialize, Serialize};

/// Root configuration shared by the backend and the edge proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ReproConfig {
    /// Slow backend settings.
    pub backend: BackendConfig,

    /// Edge proxy settings.
    pub proxy: ProxyConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Backend configuration: the handler that sleeps, then streams.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Artificial delay before the response starts, in seconds.
    pub delay_secs: u64,

    /// Total size of the response body in bytes.
    pub payload_bytes: u64,

    /// Size of each body chunk handed to the connection.
    pub chunk_bytes: usize,

    /// Pause between two chunks in milliseconds (0 = no pacing).
    pub chunk_interval_ms: u64,

    /// Maximum time to read request headers, in seconds.
    pub read_timeout_secs: u64,

    /// Deadline for writing the whole response, measured from request start.
    pub write_timeout_secs: u64,

    /// Maximum concurrent connections.
    pub max_connections: usize,

    /// How long shutdown waits for in-flight connections, in seconds.
    pub drain_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            delay_secs: 10,
            payload_bytes: 900 * 1000 * 1000,
            chunk_bytes: 64 * 1024,
            chunk_interval_ms: 0,
            read_timeout_secs: 600,
            write_timeout_secs: 600,
            max_connections: 1024,
            drain_timeout_secs: 30,
        }
    }
}

/// Edge proxy configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Bind address for client connections.
    pub bind_address: String,

    /// Upstream base URL (scheme and authority only).
    pub upstream: String,

    /// Upstream TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Upstream read timeout in seconds: response head, then gap between body reads.
    pub read_timeout_secs: u64,

    /// Gap allowed between two reads of the client body sent upstream, in seconds.
    pub send_timeout_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:80".to_string(),
            upstream: "http://127.0.0.1:8080".to_string(),
            connect_timeout_secs: 5,
            read_timeout_secs: 5,
            send_timeout_secs: 5,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable, for development.
    #[default]
    Pretty,
    /// One JSON object per line, for log aggregation.
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level or filter directive (overridden by `RUST_LOG`).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_reproduce_the_mismatch() {
        let config = ReproConfig::default();
        assert_eq!(config.backend.payload_bytes, 900_000_000);
        assert!(config.proxy.read_timeout_secs < config.backend.delay_secs);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: ReproConfig = toml::from_str(
            r#"
            [backend]
            delay_secs = 2

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.backend.delay_secs, 2);
        assert_eq!(config.backend.chunk_bytes, 64 * 1024);
        assert_eq!(config.proxy, ProxyConfig::default());
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }
}
