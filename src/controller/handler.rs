//! Handler capability set.

use std::sync::Arc;

use async_trait::async_trait;

use crate::controller::{ConnectionContext, Controller};
use crate::error::SessionError;
use crate::message::Payload;

/// Application logic bound to one path instance.
///
/// Every hook has a default no-op implementation, so a handler declares
/// only the lifecycle moments it cares about. Hooks receive the owning
/// [`Controller`] for instance operations (send, broadcast, params,
/// pub/sub) and the triggering connection where one exists.
///
/// Hook errors are routed to the instance's error filter, scoped to the
/// triggering connection; they never affect other connections.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Runs once, right after the instance is created.
    async fn on_init(&self, instance: &Arc<Controller>) -> Result<(), SessionError> {
        let _ = instance;
        Ok(())
    }

    /// Runs for each connection that passed the instance guards.
    async fn on_connect(
        &self,
        instance: &Arc<Controller>,
        ctx: &Arc<ConnectionContext>,
    ) -> Result<(), SessionError> {
        let _ = (instance, ctx);
        Ok(())
    }

    /// Runs for each inbound message after the request pipe chain.
    async fn on_message(
        &self,
        instance: &Arc<Controller>,
        message: Payload,
        ctx: &Arc<ConnectionContext>,
    ) -> Result<(), SessionError> {
        let _ = (instance, message, ctx);
        Ok(())
    }

    /// Runs on transport-level error events.
    async fn on_error(
        &self,
        instance: &Arc<Controller>,
        error: &str,
        ctx: &Arc<ConnectionContext>,
    ) -> Result<(), SessionError> {
        let _ = (instance, error, ctx);
        Ok(())
    }

    /// Runs when a connection closes, before it detaches.
    async fn on_close(
        &self,
        instance: &Arc<Controller>,
        code: u16,
        reason: &str,
        ctx: &Arc<ConnectionContext>,
    ) -> Result<(), SessionError> {
        let _ = (instance, code, reason, ctx);
        Ok(())
    }

    /// Runs once, when the last connection has detached.
    async fn on_destroy(&self, instance: &Arc<Controller>) {
        let _ = instance;
    }
}

/// Creates one handler per controller instance.
pub type HandlerFactory = Arc<dyn Fn() -> Box<dyn Handler> + Send + Sync>;
