//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → semantic checks (loader.rs)
//!     → ServerConfig (validated, immutable)
//!     → merged into RouterConfig at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Route tables and guards are code, not config; only tunables live here

pub mod loader;
pub mod schema;

pub use schema::{ListenerConfig, MaxRequests, ObservabilityConfig, RateLimitConfig, ServerConfig};
