//! Path-keyed in-process publish/subscribe.
//!
//! # Data Flow
//! ```text
//! controller A (path /chats/7)
//!     → notify("/chats/unread", data)
//!     → subscription table lookup
//!     → callbacks for "/chats/unread", in subscription order
//!     → controller B reacts
//! ```
//!
//! # Design Decisions
//! - Synchronous fan-out; a failing callback never blocks the rest
//! - Unsubscribe is by opaque token, not callback identity
//! - Callbacks are cloned out of the lock before invocation, so a callback
//!   may itself subscribe or notify without deadlocking

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;
use uuid::Uuid;

use crate::error::SessionError;

/// Callback invoked with the published data.
pub type NotifyCallback = Arc<dyn Fn(&Value) -> Result<(), SessionError> + Send + Sync>;

/// Path-keyed subscription table shared by the router and all controllers.
#[derive(Default)]
pub struct Notifier {
    table: Mutex<HashMap<String, Vec<(Uuid, NotifyCallback)>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` under `path`. The returned subscription removes
    /// exactly this registration when unsubscribed.
    pub fn subscribe(self: &Arc<Self>, path: &str, callback: NotifyCallback) -> Subscription {
        let token = Uuid::new_v4();
        self.table
            .lock()
            .expect("notifier table mutex poisoned")
            .entry(path.to_string())
            .or_default()
            .push((token, callback));

        tracing::trace!(path, %token, "notifier subscription added");
        Subscription {
            token,
            path: path.to_string(),
            notifier: Arc::downgrade(self),
        }
    }

    /// Invoke every callback subscribed to `path`, in subscription order.
    /// A callback error is logged and does not stop the remaining ones.
    pub fn notify(&self, path: &str, data: &Value) {
        let callbacks: Vec<NotifyCallback> = {
            let table = self.table.lock().expect("notifier table mutex poisoned");
            match table.get(path) {
                Some(entries) => entries.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
                None => return,
            }
        };

        for callback in callbacks {
            if let Err(err) = callback(data) {
                tracing::warn!(path, error = %err, "notifier callback failed");
            }
        }
    }

    /// Drop every subscription for `path`.
    pub fn clear(&self, path: &str) {
        self.table
            .lock()
            .expect("notifier table mutex poisoned")
            .remove(path);
    }

    /// Number of live subscriptions for `path`.
    pub fn subscription_count(&self, path: &str) -> usize {
        self.table
            .lock()
            .expect("notifier table mutex poisoned")
            .get(path)
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn unsubscribe(&self, path: &str, token: Uuid) {
        let mut table = self.table.lock().expect("notifier table mutex poisoned");
        if let Some(entries) = table.get_mut(path) {
            entries.retain(|(id, _)| *id != token);
            if entries.is_empty() {
                table.remove(path);
            }
        }
    }
}

/// Handle for one registration. Cloneable; unsubscribing any clone removes
/// the registration, and repeated unsubscribes are no-ops.
#[derive(Clone)]
pub struct Subscription {
    token: Uuid,
    path: String,
    notifier: Weak<Notifier>,
}

impl Subscription {
    /// Remove this registration from the table.
    pub fn unsubscribe(&self) {
        if let Some(notifier) = self.notifier.upgrade() {
            notifier.unsubscribe(&self.path, self.token);
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}
