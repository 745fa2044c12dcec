//! Metrics collection and exposition.
//!
//! # Metrics
//! - `switchboard_connections_total` (counter): accepted connections
//! - `switchboard_active_connections` (gauge): current connection count
//! - `switchboard_messages_total` (counter): inbound frames by kind
//! - `switchboard_rate_limited_total` (counter): throttled messages
//! - `switchboard_errors_total` (counter): errors handled by the filter

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "metrics exporter listening"),
        Err(err) => tracing::error!(error = %err, "failed to install metrics exporter"),
    }
}

pub fn record_connection_opened() {
    counter!("switchboard_connections_total").increment(1);
    gauge!("switchboard_active_connections").increment(1.0);
}

pub fn record_connection_closed() {
    gauge!("switchboard_active_connections").decrement(1.0);
}

pub fn record_message(kind: &'static str) {
    counter!("switchboard_messages_total", "kind" => kind).increment(1);
}

pub fn record_rate_limited() {
    counter!("switchboard_rate_limited_total").increment(1);
}

pub fn record_error(code: u16) {
    counter!("switchboard_errors_total", "code" => code.to_string()).increment(1);
}
