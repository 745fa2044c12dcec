//! Per-connection state.

use std::any::Any;
use std::sync::{Arc, OnceLock};

use crate::net::connection::{ConnectionId, QueryParams, RequestMeta, Socket};

/// One physical connection: transport handle, request metadata and a
/// write-once payload slot guards use to hand authorization results to
/// handler logic.
///
/// A context belongs to exactly one controller for its entire lifetime.
pub struct ConnectionContext {
    id: ConnectionId,
    socket: Arc<dyn Socket>,
    meta: RequestMeta,
    query: QueryParams,
    payload: OnceLock<Box<dyn Any + Send + Sync>>,
}

impl ConnectionContext {
    pub fn new(socket: Arc<dyn Socket>, meta: RequestMeta) -> Self {
        let query = meta.query_params();
        Self {
            id: ConnectionId::new(),
            socket,
            meta,
            query,
            payload: OnceLock::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn socket(&self) -> &Arc<dyn Socket> {
        &self.socket
    }

    pub fn meta(&self) -> &RequestMeta {
        &self.meta
    }

    /// Query parameters parsed from this connection's own target URI.
    pub fn query(&self) -> &QueryParams {
        &self.query
    }

    /// Attach a typed payload, usually from a guard. The slot is
    /// write-once; returns false if something was already attached.
    pub fn set_payload<T: Any + Send + Sync>(&self, value: T) -> bool {
        self.payload.set(Box::new(value)).is_ok()
    }

    /// Read the payload back under its concrete type.
    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.get().and_then(|slot| slot.downcast_ref::<T>())
    }
}

impl std::fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("id", &self.id)
            .field("target", &self.meta.target())
            .finish_non_exhaustive()
    }
}
