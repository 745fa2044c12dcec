//! WebSocket listener built on axum.
//!
//! # Responsibilities
//! - Accept HTTP upgrade requests on every path
//! - Capture request metadata (target URI, headers) before the upgrade
//! - Adapt the upgraded socket to the `Socket` trait + event stream
//! - Graceful shutdown via signal or `Shutdown` coordinator

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderMap, Uri};
use axum::response::Response;
use axum::routing::any;
use futures_util::future::ready;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use crate::message::Payload;
use crate::net::connection::{RequestMeta, Socket, TransportEvent};
use crate::routing::SessionRouter;

/// Close code used when the peer closed without a status.
const NO_STATUS: u16 = 1005;

/// Run the server until Ctrl+C.
pub async fn serve(router: Arc<SessionRouter>, listener: TcpListener) -> std::io::Result<()> {
    serve_with_shutdown(router, listener, shutdown_signal()).await
}

/// Run the server until `signal` resolves; in-flight sessions drain.
pub async fn serve_with_shutdown<F>(
    router: Arc<SessionRouter>,
    listener: TcpListener,
    signal: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "session server listening");

    let app = axum::Router::new()
        .route("/", any(upgrade_handler))
        .route("/{*path}", any(upgrade_handler))
        .with_state(router)
        .layer(TraceLayer::new_for_http());

    axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .await?;

    tracing::info!("session server stopped");
    Ok(())
}

/// Upgrade handler wired to every path.
async fn upgrade_handler(
    State(router): State<Arc<SessionRouter>>,
    uri: Uri,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let target = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let meta = RequestMeta::new(target, headers);

    ws.on_upgrade(move |socket| handle_socket(router, socket, meta))
}

enum OutboundFrame {
    Text(String),
    Binary(Vec<u8>),
    Close(u16, String),
}

/// `Socket` implementation backed by the writer-task queue.
struct WsHandle {
    tx: mpsc::UnboundedSender<OutboundFrame>,
    open: AtomicBool,
}

impl Socket for WsHandle {
    fn send_text(&self, text: String) {
        let _ = self.tx.send(OutboundFrame::Text(text));
    }

    fn send_binary(&self, data: Vec<u8>) {
        let _ = self.tx.send(OutboundFrame::Binary(data));
    }

    fn close(&self, code: u16, reason: &str) {
        // First close wins; later frames are dropped by the writer.
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self
                .tx
                .send(OutboundFrame::Close(code, reason.to_string()));
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.tx.is_closed()
    }
}

/// Drive one upgraded socket through the router.
async fn handle_socket(router: Arc<SessionRouter>, socket: WebSocket, meta: RequestMeta) {
    let (mut sink, stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundFrame>();

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let result = match frame {
                OutboundFrame::Text(text) => sink.send(Message::Text(text.into())).await,
                OutboundFrame::Binary(data) => sink.send(Message::Binary(data.into())).await,
                OutboundFrame::Close(code, reason) => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    break;
                }
            };
            if result.is_err() {
                break;
            }
        }
    });

    let handle: Arc<dyn Socket> = Arc::new(WsHandle {
        tx,
        open: AtomicBool::new(true),
    });
    let events = stream.filter_map(|frame| ready(map_frame(frame)));

    router.handle_connection(handle, meta, events).await;

    // Let queued frames flush; a handler holding the socket open past its
    // close event should not wedge the task.
    if tokio::time::timeout(Duration::from_secs(1), &mut writer)
        .await
        .is_err()
    {
        writer.abort();
    }
}

fn map_frame(frame: Result<Message, axum::Error>) -> Option<TransportEvent> {
    match frame {
        Ok(Message::Text(text)) => Some(TransportEvent::Message(Payload::Text(
            text.as_str().to_string(),
        ))),
        Ok(Message::Binary(data)) => {
            Some(TransportEvent::Message(Payload::Binary(data.to_vec())))
        }
        Ok(Message::Ping(_) | Message::Pong(_)) => None,
        Ok(Message::Close(Some(frame))) => Some(TransportEvent::Closed {
            code: frame.code,
            reason: frame.reason.to_string(),
        }),
        Ok(Message::Close(None)) => Some(TransportEvent::Closed {
            code: NO_STATUS,
            reason: String::new(),
        }),
        Err(err) => Some(TransportEvent::Error(err.to_string())),
    }
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received");
}
