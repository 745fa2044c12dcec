//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → stop accepting upgrades → connections drain → exit
//! ```
//!
//! # Design Decisions
//! - One broadcast channel; every long-running task subscribes
//! - The listener finishes in-flight sessions before returning

pub mod shutdown;

pub use shutdown::Shutdown;
