//! Shared fixtures for unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::http::HeaderMap;

use crate::controller::ConnectionContext;
use crate::net::connection::{RequestMeta, Socket};

/// In-memory socket recording everything written to it.
#[derive(Debug, Default)]
pub struct MockSocket {
    pub sent_text: Mutex<Vec<String>>,
    pub sent_binary: Mutex<Vec<Vec<u8>>>,
    pub closed: Mutex<Option<(u16, String)>>,
    open: AtomicBool,
}

impl MockSocket {
    pub fn new() -> Arc<Self> {
        let socket = Self::default();
        socket.open.store(true, Ordering::SeqCst);
        Arc::new(socket)
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent_text.lock().expect("sent mutex poisoned").clone()
    }

    pub fn close_code(&self) -> Option<u16> {
        self.closed
            .lock()
            .expect("closed mutex poisoned")
            .as_ref()
            .map(|(code, _)| *code)
    }
}

impl Socket for MockSocket {
    fn send_text(&self, text: String) {
        self.sent_text.lock().expect("sent mutex poisoned").push(text);
    }

    fn send_binary(&self, data: Vec<u8>) {
        self.sent_binary
            .lock()
            .expect("sent mutex poisoned")
            .push(data);
    }

    fn close(&self, code: u16, reason: &str) {
        self.open.store(false, Ordering::SeqCst);
        *self.closed.lock().expect("closed mutex poisoned") = Some((code, reason.to_string()));
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// A connection context backed by a fresh mock socket.
pub fn mock_context(target: &str) -> ConnectionContext {
    ConnectionContext::new(MockSocket::new(), RequestMeta::new(target, HeaderMap::new()))
}
