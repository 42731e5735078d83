//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the state-sync server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SyncConfig {
    /// Listener configuration (bind address, WebSocket path).
    pub listener: ListenerConfig,

    /// Heartbeat / liveness settings.
    pub heartbeat: HeartbeatConfig,

    /// Admission and rate limits.
    pub limits: LimitsConfig,

    /// Retry policy for binding the listening socket.
    pub bind_retry: BindRetryConfig,

    /// Event subscription settings.
    pub events: EventsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Path clients upgrade on.
    pub path: String,

    /// Largest inbound text frame accepted, in bytes.
    pub max_message_bytes: usize,

    /// Use the first `X-Forwarded-For` address as the client source.
    /// Only enable behind a trusted reverse proxy.
    pub trust_forwarded_for: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            path: "/state-sync".to_string(),
            max_message_bytes: 64 * 1024,
            trust_forwarded_for: false,
        }
    }
}

/// Heartbeat configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Time between liveness sweeps in milliseconds.
    pub interval_ms: u64,

    /// Maximum time since a connection's last liveness signal, in milliseconds.
    pub timeout_ms: u64,
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            timeout_ms: 60_000,
        }
    }
}

/// Admission and rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum concurrent connections from one source address.
    pub max_connections_per_source: usize,

    /// Maximum messages per connection within one window.
    pub max_messages_per_window: usize,

    /// Sliding window length in milliseconds.
    pub window_ms: u64,
}

impl LimitsConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections_per_source: 10,
            max_messages_per_window: 100,
            window_ms: 1_000,
        }
    }
}

/// Bind retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BindRetryConfig {
    /// Fixed delay between bind attempts in milliseconds.
    pub delay_ms: u64,

    /// Total bind attempts before giving up.
    pub max_attempts: u32,
}

impl BindRetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for BindRetryConfig {
    fn default() -> Self {
        Self {
            delay_ms: 5_000,
            max_attempts: 10,
        }
    }
}

/// Event subscription configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Events buffered per subscriber before a slow subscriber starts lagging.
    pub buffer: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { buffer: 1024 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}
