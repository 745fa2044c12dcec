//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! subsystems → tracing spans/events → fmt subscriber (EnvFilter)
//! subsystems → metrics counters/gauges → Prometheus exporter (optional)
//! ```
//!
//! # Design Decisions
//! - Structured logging via tracing; level configurable per environment
//! - Metric updates are cheap counters; the exporter is opt-in

pub mod logging;
pub mod metrics;
