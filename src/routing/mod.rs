//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming connection (target, headers)
//!     → router.rs (capacity, global guards)
//!     → matcher.rs (normalize, prefix strip, pattern match, params)
//!     → registry lookup-or-create (one controller per resolved path)
//!     → controller handoff + per-connection event loop
//! ```
//!
//! # Design Decisions
//! - An existing instance under the resolved path wins without re-matching
//! - Routes are registered once at startup, immutable at runtime
//! - Deterministic: equal segment count, byte-equal literals, first
//!   registration-order match wins
//! - The registry is the single owner of instance lifecycles

pub mod matcher;
pub mod route;
pub mod router;

pub use matcher::Params;
pub use route::Route;
pub use router::{RouterConfig, SessionRouter};
