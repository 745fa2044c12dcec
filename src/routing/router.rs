//! Top-level connection dispatch.
//!
//! # Responsibilities
//! - Admission control (capacity, global guards)
//! - Path resolution and controller lookup-or-create
//! - Per-connection event loop after handoff
//! - Registry of live controller instances keyed by resolved path

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use futures_util::{Stream, StreamExt};
use serde_json::Value;

use crate::config::RateLimitConfig;
use crate::controller::{Admission, ConnectionContext, Controller, ControllerConfig, DestroyCallback};
use crate::error::{ErrorFilter, LogErrorFilter, SessionError};
use crate::guard::{self, Guard};
use crate::net::connection::{ConnectionTracker, RequestMeta, Socket, TransportEvent};
use crate::notify::Notifier;
use crate::observability::metrics;
use crate::routing::matcher;
use crate::routing::route::Route;

/// Close code synthesized when the event stream ends without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;

/// Called once when the router is constructed.
pub type InitCallback = Arc<dyn Fn() + Send + Sync>;

/// Called after each successful connection handoff.
pub type ConnectCallback =
    Arc<dyn Fn() -> BoxFuture<'static, Result<(), SessionError>> + Send + Sync>;

/// Construction bundle for [`SessionRouter`].
///
/// The route table and guards are code; the tunable parts (`prefix_path`,
/// `rate_limit`) usually come from [`crate::config::ServerConfig`].
#[derive(Default)]
pub struct RouterConfig {
    pub routes: Vec<Route>,
    pub prefix_path: Option<String>,
    pub connect_guards: Vec<Arc<dyn Guard>>,
    pub error_filter: Option<Arc<dyn ErrorFilter>>,
    pub rate_limit: Option<RateLimitConfig>,
    pub on_init: Option<InitCallback>,
    pub on_connect: Option<ConnectCallback>,
}

impl RouterConfig {
    pub fn new(routes: Vec<Route>) -> Self {
        Self {
            routes,
            ..Self::default()
        }
    }
}

type Registry = Arc<Mutex<HashMap<String, Arc<Controller>>>>;

/// Owns the static route table, the global guard chain, the rate-limit
/// policy and the registry of live controller instances.
pub struct SessionRouter {
    routes: Vec<Route>,
    prefix: String,
    connect_guards: Vec<Arc<dyn Guard>>,
    controllers: Registry,
    notifier: Arc<Notifier>,
    error_filter: Arc<dyn ErrorFilter>,
    rate_limit: Option<RateLimitConfig>,
    tracker: ConnectionTracker,
    on_connect: Option<ConnectCallback>,
}

impl SessionRouter {
    pub fn new(config: RouterConfig) -> Arc<Self> {
        let prefix = matcher::normalize_path(config.prefix_path.as_deref().unwrap_or("/"));

        let router = Arc::new(Self {
            routes: config.routes,
            prefix,
            connect_guards: config.connect_guards,
            controllers: Arc::new(Mutex::new(HashMap::new())),
            notifier: Arc::new(Notifier::new()),
            error_filter: config
                .error_filter
                .unwrap_or_else(|| Arc::new(LogErrorFilter)),
            rate_limit: config.rate_limit,
            tracker: ConnectionTracker::new(),
            on_connect: config.on_connect,
        });

        if let Some(on_init) = &config.on_init {
            on_init();
        }

        router
    }

    /// Drive one connection from admission to close.
    ///
    /// `events` is the inbound side of the transport; the loop runs until
    /// it yields a close event or ends. Every failure funnels to the error
    /// filter with this connection's socket; nothing escapes.
    pub async fn handle_connection<S>(&self, socket: Arc<dyn Socket>, meta: RequestMeta, mut events: S)
    where
        S: Stream<Item = TransportEvent> + Unpin + Send,
    {
        let _slot = self.tracker.track();
        metrics::record_connection_opened();

        let ctx = Arc::new(ConnectionContext::new(Arc::clone(&socket), meta));
        tracing::info!(
            connection_id = %ctx.id(),
            target = %ctx.meta().target(),
            "connection received"
        );

        let controller = loop {
            let (controller, created) = match self.admit(&ctx).await {
                Ok(admitted) => admitted,
                Err(err) => {
                    self.error_filter.handle(&err, Some(socket.as_ref()));
                    // A non-closing rejection leaves the connection open;
                    // keep reading so the peer decides when to hang up.
                    if !err.is_closing() {
                        drain(&mut events).await;
                    }
                    metrics::record_connection_closed();
                    return;
                }
            };

            if created {
                controller.run_init().await;
            }
            match controller.accept(Arc::clone(&ctx)).await {
                Admission::Attached => break controller,
                // Never attached: the instance ignores this connection's
                // traffic entirely.
                Admission::Rejected => {
                    drain(&mut events).await;
                    metrics::record_connection_closed();
                    return;
                }
                // Lost a race with the instance's destruction; admit again.
                Admission::Stale => continue,
            }
        };

        if let Some(on_connect) = &self.on_connect {
            if on_connect().await.is_err() {
                self.error_filter
                    .handle(&SessionError::internal(), Some(socket.as_ref()));
            }
        }

        let mut closed = false;
        while let Some(event) = events.next().await {
            match event {
                TransportEvent::Message(payload) => {
                    controller.handle_message(payload, &ctx).await;
                }
                TransportEvent::Error(error) => {
                    controller.handle_error(&error, &ctx).await;
                }
                TransportEvent::Closed { code, reason } => {
                    controller.handle_close(code, &reason, &ctx).await;
                    closed = true;
                    break;
                }
            }
        }

        if !closed {
            controller.handle_close(ABNORMAL_CLOSURE, "", &ctx).await;
        }
        metrics::record_connection_closed();
    }

    /// Admission: capacity, global guards, path resolution, controller
    /// lookup-or-create. The new controller is registered before handoff.
    async fn admit(
        &self,
        ctx: &Arc<ConnectionContext>,
    ) -> Result<(Arc<Controller>, bool), SessionError> {
        self.check_capacity()?;
        guard::check(&self.connect_guards, ctx).await?;

        let resolved = matcher::resolve(ctx.meta().path(), &self.prefix);

        let mut registry = self
            .controllers
            .lock()
            .expect("controller registry mutex poisoned");

        if let Some(existing) = registry.get(&resolved) {
            if !existing.is_destroyed() {
                return Ok((Arc::clone(existing), false));
            }
            // Destroyed but not yet deregistered; replace it here. Its
            // pending teardown callback will find a different instance
            // under the key and leave the replacement alone.
            registry.remove(&resolved);
        }

        let (route, params) = matcher::match_route(&self.routes, &resolved)
            .ok_or_else(SessionError::not_found)?;

        let destroy_cb: DestroyCallback = {
            let registry = Arc::clone(&self.controllers);
            let key = resolved.clone();
            Box::new(move |controller: &Controller| {
                let mut registry = registry.lock().expect("controller registry mutex poisoned");
                let still_registered = registry
                    .get(&key)
                    .is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), controller));
                if still_registered {
                    registry.remove(&key);
                }
            })
        };

        let controller = Controller::new(ControllerConfig {
            path: resolved.clone(),
            params,
            query: ctx.query().clone(),
            guards: route.guards.clone(),
            request_pipes: route.request_pipes.clone(),
            response_pipes: route.response_pipes.clone(),
            rate_limit: route.rate_limit.clone().or_else(|| self.rate_limit.clone()),
            notifier: Arc::clone(&self.notifier),
            error_filter: Arc::clone(&self.error_filter),
            destroy_cb,
            handler: (route.factory)(),
        });

        registry.insert(resolved, Arc::clone(&controller));
        tracing::debug!(path = %controller.path(), "controller created");

        Ok((controller, true))
    }

    fn check_capacity(&self) -> Result<(), SessionError> {
        let Some(max) = self.rate_limit.as_ref().and_then(|rl| rl.max_connections) else {
            return Ok(());
        };
        // The current connection is already counted.
        if self.tracker.active_count() > max as u64 {
            return Err(SessionError::service_unavailable());
        }
        Ok(())
    }

    /// Push an event into the handler ecosystem from outside any handler.
    pub fn notify_path(&self, path: &str, data: &Value) {
        self.notifier.notify(path, data);
    }

    /// The shared notifier handle.
    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    /// Number of live controller instances.
    pub fn controller_count(&self) -> usize {
        self.controllers
            .lock()
            .expect("controller registry mutex poisoned")
            .len()
    }

    /// Look up the live controller for a resolved path, if any.
    pub fn controller(&self, path: &str) -> Option<Arc<Controller>> {
        self.controllers
            .lock()
            .expect("controller registry mutex poisoned")
            .get(path)
            .cloned()
    }

    /// Current live connection count across all instances.
    pub fn connection_count(&self) -> u64 {
        self.tracker.active_count()
    }
}

/// Consume a connection's events without dispatching, until the peer
/// closes or the stream ends.
async fn drain<S>(events: &mut S)
where
    S: Stream<Item = TransportEvent> + Unpin + Send,
{
    while let Some(event) = events.next().await {
        if matches!(event, TransportEvent::Closed { .. }) {
            break;
        }
    }
}

impl std::fmt::Debug for SessionRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRouter")
            .field("routes", &self.routes.len())
            .field("prefix", &self.prefix)
            .field("controllers", &self.controller_count())
            .finish_non_exhaustive()
    }
}
