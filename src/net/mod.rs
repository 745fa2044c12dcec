//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! HTTP upgrade request
//!     → listener.rs (axum route, upgrade handshake, metadata capture)
//!     → connection.rs (Socket handle, writer task, event mapping)
//!     → SessionRouter::handle_connection (admission, dispatch loop)
//!
//! Connection states:
//!     Upgrading → Active → Closed
//! ```
//!
//! # Design Decisions
//! - The core routes through the `Socket` trait and a `TransportEvent`
//!   stream, so tests run without a live server
//! - Writes go through a queue to a dedicated writer task; sends are
//!   fire-and-forget
//! - Ping/pong frames are handled transparently, never surfaced

pub mod connection;
pub mod listener;

pub use connection::{
    ConnectionId, ConnectionTracker, QueryParams, RequestMeta, Socket, TransportEvent,
};
pub use listener::{serve, serve_with_shutdown};
