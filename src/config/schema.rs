//! Configuration schema definitions.
//!
//! This module defines the file-loadable configuration for the server.
//! All types derive Serde traits for deserialization from config files.
//! The programmatic parts of router setup (route table, guards, lifecycle
//! callbacks) live in [`crate::routing::RouterConfig`] and are not
//! serialized.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the session server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, capacity).
    pub listener: ListenerConfig,

    /// Path prefix stripped from every target before route matching.
    pub prefix_path: Option<String>,

    /// Default rate-limit policy, overridable per route.
    pub rate_limit: RateLimitConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Rate limiting policy.
///
/// `max_requests` throttles messages per connection with a fixed window;
/// `max_connections` caps the number of concurrently attached connections.
/// Both parts are optional and absent means unlimited.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Per-connection message throttle.
    pub max_requests: Option<MaxRequests>,

    /// Concurrent connection cap.
    pub max_connections: Option<usize>,
}

/// Fixed-window message throttle: at most `counter` messages per
/// `window_ms` milliseconds.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct MaxRequests {
    /// Messages allowed inside one window.
    pub counter: u32,

    /// Window length in milliseconds.
    pub window_ms: u64,
}

impl MaxRequests {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
