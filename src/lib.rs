//! Switchboard — a connection router for long-lived WebSocket sessions.
//!
//! Routes incoming connections by path to stateful controller instances,
//! runs guard and pipe chains around them, throttles chatty peers and
//! wires instances together through path-keyed pub/sub.

// Core subsystems
pub mod config;
pub mod controller;
pub mod message;
pub mod net;
pub mod routing;

// Middleware
pub mod guard;
pub mod limit;
pub mod pipe;

// Cross-cutting concerns
pub mod error;
pub mod lifecycle;
pub mod notify;
pub mod observability;

#[cfg(test)]
pub(crate) mod testing;

pub use config::ServerConfig;
pub use controller::{ConnectionContext, Controller, Handler};
pub use error::{ErrorFilter, SessionError, Status};
pub use guard::Guard;
pub use lifecycle::Shutdown;
pub use message::Payload;
pub use net::{serve, serve_with_shutdown, Socket};
pub use pipe::Pipe;
pub use routing::{Route, RouterConfig, SessionRouter};
