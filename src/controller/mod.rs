//! Path instances.
//!
//! # Data Flow
//! ```text
//! router handoff
//!     → accept (capacity, instance guards, connect hook)
//!     → per-message: rate limit → request pipes → message hook
//!     → outbound: response pipes → socket
//!     → close: close hook → detach → last one out destroys the instance
//! ```
//!
//! # Design Decisions
//! - One instance per resolved path, shared by every connection on it
//! - Lifecycle: Created → Active → Destroyed; destroy runs at most once,
//!   exactly when the connection count drops from 1 to 0
//! - A denied instance guard leaves the connection attached; it is counted
//!   until its close event arrives (router guards, in contrast, deny
//!   before anything attaches)
//! - Errors terminate at the error filter, scoped to one connection

pub mod context;
pub mod handler;

pub use context::ConnectionContext;
pub use handler::{Handler, HandlerFactory};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::join_all;
use serde_json::Value;

use crate::config::RateLimitConfig;
use crate::error::{ErrorFilter, SessionError};
use crate::guard::{self, Guard};
use crate::limit::RateLimiter;
use crate::message::Payload;
use crate::net::connection::{write_payload, ConnectionId};
use crate::notify::{Notifier, Subscription};
use crate::observability::metrics;
use crate::pipe::{self, Pipe};
use crate::routing::matcher::Params;
use crate::net::connection::QueryParams;

/// Callback deregistering an instance from the router registry. It
/// receives the instance being destroyed so a replacement registered
/// under the same path is left alone.
pub(crate) type DestroyCallback = Box<dyn Fn(&Controller) + Send + Sync>;

/// Outcome of [`Controller::accept`].
pub(crate) enum Admission {
    /// The connection attached; dispatch its events to this instance.
    Attached,
    /// Capacity-rejected without attaching; its traffic is ignored.
    Rejected,
    /// The instance was destroyed concurrently; admission must restart.
    Stale,
}

/// Everything a controller instance is born with. Guard and pipe chains
/// are copied from the matched route at creation time.
pub(crate) struct ControllerConfig {
    pub path: String,
    pub params: Params,
    pub query: QueryParams,
    pub guards: Vec<Arc<dyn Guard>>,
    pub request_pipes: Vec<Arc<dyn Pipe>>,
    pub response_pipes: Vec<Arc<dyn Pipe>>,
    pub rate_limit: Option<RateLimitConfig>,
    pub notifier: Arc<Notifier>,
    pub error_filter: Arc<dyn ErrorFilter>,
    pub destroy_cb: DestroyCallback,
    pub handler: Box<dyn Handler>,
}

/// The stateful handler instance bound to one resolved path.
///
/// Owns the set of currently-open connections attached to it, runs guard
/// and pipe chains per connection and per message, and self-destructs when
/// its last connection closes.
pub struct Controller {
    path: String,
    params: Params,
    query: QueryParams,
    guards: Vec<Arc<dyn Guard>>,
    request_pipes: Vec<Arc<dyn Pipe>>,
    response_pipes: Vec<Arc<dyn Pipe>>,
    handler: Box<dyn Handler>,
    contexts: Mutex<Vec<Arc<ConnectionContext>>>,
    rate_limiter: RateLimiter<ConnectionId>,
    max_connections: Option<usize>,
    notifier: Arc<Notifier>,
    error_filter: Arc<dyn ErrorFilter>,
    destroy_cb: DestroyCallback,
    destroyed: AtomicBool,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl Controller {
    pub(crate) fn new(config: ControllerConfig) -> Arc<Self> {
        let rate_limit = config.rate_limit.unwrap_or_default();
        Arc::new(Self {
            path: config.path,
            params: config.params,
            query: config.query,
            guards: config.guards,
            request_pipes: config.request_pipes,
            response_pipes: config.response_pipes,
            handler: config.handler,
            contexts: Mutex::new(Vec::new()),
            rate_limiter: RateLimiter::new(rate_limit.max_requests),
            max_connections: rate_limit.max_connections,
            notifier: config.notifier,
            error_filter: config.error_filter,
            destroy_cb: config.destroy_cb,
            destroyed: AtomicBool::new(false),
            subscriptions: Mutex::new(Vec::new()),
        })
    }

    /// Run the init hook once, right after creation.
    pub(crate) async fn run_init(self: &Arc<Self>) {
        if let Err(err) = self.handler.on_init(self).await {
            self.error_filter.handle(&err, None);
        }
    }

    /// Attach a connection: capacity check, instance guards, connect hook.
    ///
    /// The capacity check and the attach share one lock acquisition, so
    /// concurrent accepts cannot overshoot `max_connections`; a rejection
    /// never attaches. A guard denial happens after the context is already
    /// attached and counted; the connection stays in the live set until
    /// its close event.
    pub(crate) async fn accept(self: &Arc<Self>, ctx: Arc<ConnectionContext>) -> Admission {
        let admission = {
            let mut contexts = self.contexts.lock().expect("context set mutex poisoned");
            if self.destroyed.load(Ordering::SeqCst) {
                Admission::Stale
            } else if self.max_connections.is_some_and(|max| contexts.len() >= max) {
                Admission::Rejected
            } else {
                contexts.push(Arc::clone(&ctx));
                Admission::Attached
            }
        };

        match admission {
            Admission::Stale => return Admission::Stale,
            Admission::Rejected => {
                self.error_filter
                    .handle(&SessionError::service_unavailable(), Some(ctx.socket().as_ref()));
                return Admission::Rejected;
            }
            Admission::Attached => {}
        }
        tracing::debug!(path = %self.path, connection_id = %ctx.id(), "connection attached");

        if let Err(err) = guard::check(&self.guards, &ctx).await {
            self.error_filter.handle(&err, Some(ctx.socket().as_ref()));
            return Admission::Attached;
        }

        if let Err(err) = self.handler.on_connect(self, &ctx).await {
            self.error_filter.handle(&err, Some(ctx.socket().as_ref()));
        }
        Admission::Attached
    }

    /// Handle one inbound frame from `ctx`.
    pub(crate) async fn handle_message(self: &Arc<Self>, raw: Payload, ctx: &Arc<ConnectionContext>) {
        metrics::record_message(raw.variant());

        if !self.rate_limiter.check(ctx.id()) {
            metrics::record_rate_limited();
            self.error_filter
                .handle(&SessionError::rate_limited(), Some(ctx.socket().as_ref()));
            return;
        }

        let message = match pipe::run(&self.request_pipes, raw, ctx).await {
            Ok(message) => message,
            Err(err) => {
                self.error_filter.handle(&err, Some(ctx.socket().as_ref()));
                return;
            }
        };

        if let Err(err) = self.handler.on_message(self, message, ctx).await {
            self.error_filter.handle(&err, Some(ctx.socket().as_ref()));
        }
    }

    /// Handle a transport-level error event for `ctx`.
    pub(crate) async fn handle_error(self: &Arc<Self>, error: &str, ctx: &Arc<ConnectionContext>) {
        if let Err(err) = self.handler.on_error(self, error, ctx).await {
            self.error_filter.handle(&err, None);
        }
    }

    /// Handle the close event for `ctx`: close hook, detach, destroy on
    /// the 1 → 0 transition.
    pub(crate) async fn handle_close(self: &Arc<Self>, code: u16, reason: &str, ctx: &Arc<ConnectionContext>) {
        if let Err(err) = self.handler.on_close(self, code, reason, ctx).await {
            self.error_filter.handle(&err, None);
        }

        self.rate_limiter.clear(&ctx.id());

        // The 1 → 0 decision flips the destroyed flag under the contexts
        // lock, so a racing accept observes either a live slot or a dead
        // instance, never a half-destroyed one.
        let destroy_now = {
            let mut contexts = self.contexts.lock().expect("context set mutex poisoned");
            let before = contexts.len();
            contexts.retain(|attached| attached.id() != ctx.id());
            before > 0
                && contexts.is_empty()
                && !self.destroyed.swap(true, Ordering::SeqCst)
        };
        tracing::debug!(path = %self.path, connection_id = %ctx.id(), code, "connection detached");

        if destroy_now {
            self.finalize().await;
        }
    }

    /// Runs exactly once, by whoever won the destroyed-flag flip.
    async fn finalize(self: &Arc<Self>) {
        self.handler.on_destroy(self).await;

        for subscription in self
            .subscriptions
            .lock()
            .expect("subscription list mutex poisoned")
            .drain(..)
        {
            subscription.unsubscribe();
        }
        self.notifier.clear(&self.path);

        (self.destroy_cb)(self);
        tracing::info!(path = %self.path, "controller destroyed");
    }

    /// Whether this instance already ran (or is running) its teardown.
    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Send a payload to one connection through the response pipe chain.
    /// A failing pipe step aborts the send; the error goes to the filter.
    pub async fn send(&self, ctx: &Arc<ConnectionContext>, payload: Payload) {
        let out = match pipe::run(&self.response_pipes, payload, ctx).await {
            Ok(out) => out,
            Err(err) => {
                self.error_filter.handle(&err, Some(ctx.socket().as_ref()));
                return;
            }
        };

        if let Err(err) = write_payload(ctx.socket().as_ref(), out) {
            self.error_filter.handle(
                &SessionError::internal().with_message(err.to_string()),
                Some(ctx.socket().as_ref()),
            );
        }
    }

    /// Send a payload to every attached connection, each through its own
    /// pipe execution. One connection's failure never blocks the others;
    /// completion waits for all sends to finish or fail.
    pub async fn broadcast(&self, payload: Payload) {
        let contexts: Vec<Arc<ConnectionContext>> = self
            .contexts
            .lock()
            .expect("context set mutex poisoned")
            .clone();

        join_all(
            contexts
                .iter()
                .map(|ctx| self.send(ctx, payload.clone())),
        )
        .await;
    }

    /// Subscribe a callback under this instance's own resolved path.
    /// Leftover subscriptions are removed at destroy.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Value) -> Result<(), SessionError> + Send + Sync + 'static,
    {
        let subscription = self.notifier.subscribe(&self.path, Arc::new(callback));
        self.subscriptions
            .lock()
            .expect("subscription list mutex poisoned")
            .push(subscription.clone());
        subscription
    }

    /// Publish to any path, enabling cross-instance signaling.
    pub fn publish(&self, path: &str, data: &Value) {
        let target = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        self.notifier.notify(&target, data);
    }

    /// Parameters captured from the matched route pattern. Part of the
    /// path identity, so one set per instance.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Query parameters of the connection that materialized this instance.
    /// Per-connection values live on [`ConnectionContext::query`].
    pub fn query(&self) -> &QueryParams {
        &self.query
    }

    /// The resolved path this instance is registered under.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Number of currently attached connections.
    pub fn connection_count(&self) -> usize {
        self.contexts.lock().expect("context set mutex poisoned").len()
    }

    /// Snapshot of the attached connections, in attach order.
    pub fn connections(&self) -> Vec<Arc<ConnectionContext>> {
        self.contexts.lock().expect("context set mutex poisoned").clone()
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("path", &self.path)
            .field("connections", &self.connection_count())
            .finish_non_exhaustive()
    }
}
