//! Transport boundary: socket handles, connection identity, request metadata.
//!
//! # Responsibilities
//! - Define the `Socket` trait the core routes through
//! - Generate unique connection IDs for rate-limit keys and tracing
//! - Capture upgrade-time request metadata (target URI, headers)
//! - Track the live connection count for admission control

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::http::HeaderMap;

use crate::message::Payload;

/// Global atomic counter for connection IDs.
/// Relaxed ordering is sufficient since we only need uniqueness.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a physical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Write side of a connection.
///
/// Sends are fire-and-forget: frames are queued towards the transport and
/// delivery failures surface as transport events, not as send errors.
pub trait Socket: Send + Sync {
    /// Queue a text frame.
    fn send_text(&self, text: String);

    /// Queue a binary frame.
    fn send_binary(&self, data: Vec<u8>);

    /// Close the connection with a code and reason.
    fn close(&self, code: u16, reason: &str);

    /// Whether the connection is still writable.
    fn is_open(&self) -> bool;
}

/// Queue a payload as the matching frame type.
/// Json payloads that no pipe lowered are serialized to a text frame.
pub fn write_payload(socket: &dyn Socket, payload: Payload) -> Result<(), serde_json::Error> {
    match payload {
        Payload::Text(text) => socket.send_text(text),
        Payload::Binary(data) => socket.send_binary(data),
        Payload::Json(value) => socket.send_text(serde_json::to_string(&value)?),
    }
    Ok(())
}

/// Inbound event produced by the transport for one connection.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A data frame arrived.
    Message(Payload),
    /// Transport-level error; the connection may still be open.
    Error(String),
    /// The peer closed the connection.
    Closed { code: u16, reason: String },
}

/// Query parameters parsed from the connection's target URI.
pub type QueryParams = HashMap<String, String>;

/// Request metadata captured at upgrade time.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    target: String,
    headers: HeaderMap,
}

impl RequestMeta {
    pub fn new(target: impl Into<String>, headers: HeaderMap) -> Self {
        Self {
            target: target.into(),
            headers,
        }
    }

    /// The raw request target, path plus optional query.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The path component of the target.
    pub fn path(&self) -> &str {
        match self.target.split_once('?') {
            Some((path, _)) => path,
            None => &self.target,
        }
    }

    /// A header value as UTF-8, if present and valid.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Parse the query string into a key/value map.
    /// The target is resolved against a dummy base since it is origin-form.
    pub fn query_params(&self) -> QueryParams {
        let Ok(base) = url::Url::parse("http://localhost") else {
            return QueryParams::new();
        };
        match base.join(&self.target) {
            Ok(url) => url
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
            Err(_) => QueryParams::new(),
        }
    }
}

/// Tracks live connections for router-level admission control.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new live connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            active: Arc::clone(&self.active),
            id: ConnectionId::new(),
        }
    }

    /// Current live connection count.
    pub fn active_count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }
}

/// Guard holding one slot of the live connection count.
#[derive(Debug)]
pub struct ConnectionGuard {
    active: Arc<AtomicU64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(connection_id = %self.id, "connection slot released");
    }
}
