//! Static route registrations.

use std::sync::Arc;

use crate::config::RateLimitConfig;
use crate::controller::{Handler, HandlerFactory};
use crate::guard::Guard;
use crate::pipe::Pipe;

/// Maps a path pattern to a handler factory and its middleware.
///
/// Patterns are `/`-delimited sequences of literal segments and `:name`
/// parameter segments, e.g. `/chats/:id`. Routes are registered once at
/// startup and immutable afterwards.
pub struct Route {
    pub(crate) path: String,
    pub(crate) factory: HandlerFactory,
    pub(crate) guards: Vec<Arc<dyn Guard>>,
    pub(crate) request_pipes: Vec<Arc<dyn Pipe>>,
    pub(crate) response_pipes: Vec<Arc<dyn Pipe>>,
    pub(crate) rate_limit: Option<RateLimitConfig>,
}

impl Route {
    /// Register `factory` under `pattern`.
    pub fn new<F, H>(pattern: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: Handler + 'static,
    {
        Self {
            path: pattern.into(),
            factory: Arc::new(move || Box::new(factory())),
            guards: Vec::new(),
            request_pipes: Vec::new(),
            response_pipes: Vec::new(),
            rate_limit: None,
        }
    }

    /// Append an instance-level connect guard.
    pub fn guard(mut self, guard: impl Guard + 'static) -> Self {
        self.guards.push(Arc::new(guard));
        self
    }

    /// Append an inbound transform step.
    pub fn request_pipe(mut self, pipe: impl Pipe + 'static) -> Self {
        self.request_pipes.push(Arc::new(pipe));
        self
    }

    /// Append an outbound transform step.
    pub fn response_pipe(mut self, pipe: impl Pipe + 'static) -> Self {
        self.response_pipes.push(Arc::new(pipe));
        self
    }

    /// Override the router-level rate-limit policy for this route.
    pub fn rate_limit(mut self, policy: RateLimitConfig) -> Self {
        self.rate_limit = Some(policy);
        self
    }

    /// The registered pattern.
    pub fn pattern(&self) -> &str {
        &self.path
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("path", &self.path)
            .field("guards", &self.guards.len())
            .field("request_pipes", &self.request_pipes.len())
            .field("response_pipes", &self.response_pipes.len())
            .finish_non_exhaustive()
    }
}
