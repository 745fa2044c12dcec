//! Shared utilities for integration testing.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use axum::http::HeaderMap;
use futures_util::Stream;
use tokio::sync::mpsc;

use switchboard::net::{RequestMeta, Socket, TransportEvent};

/// In-memory socket recording everything written to it.
#[derive(Debug, Default)]
pub struct RecordingSocket {
    sent_text: Mutex<Vec<String>>,
    sent_binary: Mutex<Vec<Vec<u8>>>,
    closed: Mutex<Option<(u16, String)>>,
    open: AtomicBool,
}

impl RecordingSocket {
    pub fn new() -> Arc<Self> {
        let socket = Self::default();
        socket.open.store(true, Ordering::SeqCst);
        Arc::new(socket)
    }

    /// Text frames sent so far, in order.
    pub fn sent(&self) -> Vec<String> {
        self.sent_text.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn sent_binary(&self) -> Vec<Vec<u8>> {
        self.sent_binary.lock().unwrap().clone()
    }

    pub fn close_code(&self) -> Option<u16> {
        self.closed.lock().unwrap().as_ref().map(|(code, _)| *code)
    }
}

impl Socket for RecordingSocket {
    fn send_text(&self, text: String) {
        self.sent_text.lock().unwrap().push(text);
    }

    fn send_binary(&self, data: Vec<u8>) {
        self.sent_binary.lock().unwrap().push(data);
    }

    fn close(&self, code: u16, reason: &str) {
        self.open.store(false, Ordering::SeqCst);
        *self.closed.lock().unwrap() = Some((code, reason.to_string()));
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Channel-backed transport event stream for driving the router without
/// a live server.
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl Stream for EventStream {
    type Item = TransportEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// A fake connection: recording socket plus a sender that feeds the
/// event stream handed to the router.
pub fn connection() -> (
    Arc<RecordingSocket>,
    mpsc::UnboundedSender<TransportEvent>,
    EventStream,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RecordingSocket::new(), tx, EventStream { rx })
}

/// Request metadata for a target with no headers.
pub fn meta(target: &str) -> RequestMeta {
    RequestMeta::new(target, HeaderMap::new())
}

/// Give spawned connection tasks time to process queued events.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
