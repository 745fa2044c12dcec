//! Fixed-window rate limiting.
//!
//! # Data Flow
//! ```text
//! check(key)
//!     → no policy configured → allowed
//!     → first observation    → open window, count = 1, allowed
//!     → window expired       → reset window, count = 1, allowed
//!     → inside window        → count += 1, denied iff count > threshold
//! ```
//!
//! # Design Decisions
//! - Fixed windows, not sliding: expiry forgets the previous overflow
//! - Keyed by any hashable identity; the controller keys by ConnectionId
//! - `clear` drops a key's record when its connection closes, bounding memory

use std::hash::Hash;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::config::MaxRequests;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    start: Instant,
}

/// Fixed-window counter keyed by an arbitrary identity.
///
/// Unconfigured (`None` policy) limiters always allow.
#[derive(Debug)]
pub struct RateLimiter<K: Eq + Hash> {
    windows: DashMap<K, Window>,
    policy: Option<MaxRequests>,
}

impl<K: Eq + Hash> RateLimiter<K> {
    pub fn new(policy: Option<MaxRequests>) -> Self {
        Self {
            windows: DashMap::new(),
            policy,
        }
    }

    /// Record one hit for `key`. Returns false once the key strictly
    /// exceeds the configured threshold within the current window.
    pub fn check(&self, key: K) -> bool {
        let Some(policy) = &self.policy else {
            return true;
        };

        let now = Instant::now();
        match self.windows.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(Window { count: 1, start: now });
                true
            }
            Entry::Occupied(mut slot) => {
                let window = slot.get_mut();
                if now.duration_since(window.start) > policy.window() {
                    window.count = 1;
                    window.start = now;
                    return true;
                }
                window.count += 1;
                window.count <= policy.counter
            }
        }
    }

    /// Drop tracking for a key.
    pub fn clear(&self, key: &K) {
        self.windows.remove(key);
    }

    pub fn is_configured(&self) -> bool {
        self.policy.is_some()
    }
}
