//! Message transform pipes.
//!
//! # Data Flow
//! ```text
//! inbound:  raw frame → pipe A → pipe B → ... → handler
//! outbound: handler payload → pipe X → pipe Y → ... → socket
//! ```
//!
//! # Design Decisions
//! - Each step receives the previous step's output plus the context
//! - A failing step short-circuits the chain; remaining pipes never run
//! - The same chain runner serves request and response directions

pub mod commons;

use std::sync::Arc;

use async_trait::async_trait;

use crate::controller::ConnectionContext;
use crate::error::SessionError;
use crate::message::Payload;

/// Ordered transform step applied to message payloads.
#[async_trait]
pub trait Pipe: Send + Sync {
    /// Transform `value`, or raise a domain error to abort the chain.
    async fn transform(
        &self,
        value: Payload,
        ctx: &ConnectionContext,
    ) -> Result<Payload, SessionError>;
}

/// Run `pipes` in order over `value`. The first error stops the chain.
pub async fn run(
    pipes: &[Arc<dyn Pipe>],
    value: Payload,
    ctx: &ConnectionContext,
) -> Result<Payload, SessionError> {
    let mut current = value;
    for pipe in pipes {
        current = pipe.transform(current, ctx).await?;
    }
    Ok(current)
}
