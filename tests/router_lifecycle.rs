//! Lifecycle tests driven through fake transports.
//!
//! Each test spawns `handle_connection` with a channel-backed event
//! stream and a recording socket, so the full admission/dispatch/close
//! path runs without a network listener.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use switchboard::config::{MaxRequests, RateLimitConfig};
use switchboard::controller::{ConnectionContext, Controller, Handler};
use switchboard::error::SessionError;
use switchboard::guard::Guard;
use switchboard::message::Payload;
use switchboard::net::{Socket, TransportEvent};
use switchboard::pipe::Pipe;
use switchboard::routing::{Route, RouterConfig, SessionRouter};

use common::{connection, meta, settle, RecordingSocket};

/// Counters shared between handler instances and the test body.
#[derive(Default)]
struct HookLog {
    created: AtomicUsize,
    connects: AtomicUsize,
    closes: AtomicUsize,
    destroys: AtomicUsize,
    messages: Mutex<Vec<String>>,
    last_room: Mutex<Option<String>>,
}

struct LogHandler {
    log: Arc<HookLog>,
}

#[async_trait]
impl Handler for LogHandler {
    async fn on_connect(
        &self,
        instance: &Arc<Controller>,
        _ctx: &Arc<ConnectionContext>,
    ) -> Result<(), SessionError> {
        self.log.connects.fetch_add(1, Ordering::SeqCst);
        *self.log.last_room.lock().unwrap() = instance.params().get("id").cloned();
        Ok(())
    }

    async fn on_message(
        &self,
        _instance: &Arc<Controller>,
        message: Payload,
        _ctx: &Arc<ConnectionContext>,
    ) -> Result<(), SessionError> {
        if let Payload::Text(text) = &message {
            self.log.messages.lock().unwrap().push(text.clone());
        }
        Ok(())
    }

    async fn on_close(
        &self,
        _instance: &Arc<Controller>,
        _code: u16,
        _reason: &str,
        _ctx: &Arc<ConnectionContext>,
    ) -> Result<(), SessionError> {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_destroy(&self, _instance: &Arc<Controller>) {
        self.log.destroys.fetch_add(1, Ordering::SeqCst);
    }
}

fn log_route(pattern: &str, log: &Arc<HookLog>) -> Route {
    let log = Arc::clone(log);
    Route::new(pattern, move || {
        log.created.fetch_add(1, Ordering::SeqCst);
        LogHandler {
            log: Arc::clone(&log),
        }
    })
}

struct DenyGuard;

#[async_trait]
impl Guard for DenyGuard {
    async fn allow(&self, _ctx: &ConnectionContext) -> Result<bool, SessionError> {
        Ok(false)
    }
}

struct CountingGuard {
    hits: Arc<AtomicUsize>,
}

#[async_trait]
impl Guard for CountingGuard {
    async fn allow(&self, _ctx: &ConnectionContext) -> Result<bool, SessionError> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

fn spawn_connection(
    router: &Arc<SessionRouter>,
    target: &str,
) -> (
    Arc<RecordingSocket>,
    mpsc::UnboundedSender<TransportEvent>,
    JoinHandle<()>,
) {
    let (socket, tx, events) = connection();
    let request = meta(target);
    let router = Arc::clone(router);
    let handle: Arc<dyn Socket> = socket.clone();
    let task = tokio::spawn(async move {
        router.handle_connection(handle, request, events).await;
    });
    (socket, tx, task)
}

fn close_event() -> TransportEvent {
    TransportEvent::Closed {
        code: 1000,
        reason: String::new(),
    }
}

fn text_event(text: &str) -> TransportEvent {
    TransportEvent::Message(Payload::Text(text.to_string()))
}

fn first_error_code(socket: &RecordingSocket) -> Option<u64> {
    let frames = socket.sent();
    let value: Value = serde_json::from_str(frames.first()?).ok()?;
    if value["event"] != "error" {
        return None;
    }
    value["data"]["code"].as_u64()
}

#[tokio::test]
async fn connections_share_one_instance_until_last_close() {
    let log = Arc::new(HookLog::default());
    let router = SessionRouter::new(RouterConfig::new(vec![log_route("/room", &log)]));

    let (_s1, tx1, task1) = spawn_connection(&router, "/room");
    let (_s2, tx2, task2) = spawn_connection(&router, "/room");
    settle().await;

    assert_eq!(log.created.load(Ordering::SeqCst), 1);
    assert_eq!(log.connects.load(Ordering::SeqCst), 2);
    assert_eq!(router.controller_count(), 1);

    tx1.send(close_event()).unwrap();
    task1.await.unwrap();
    assert_eq!(router.controller_count(), 1);
    assert_eq!(log.destroys.load(Ordering::SeqCst), 0);

    tx2.send(close_event()).unwrap();
    task2.await.unwrap();
    assert_eq!(router.controller_count(), 0);
    assert_eq!(log.destroys.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn parameter_segments_are_captured() {
    let log = Arc::new(HookLog::default());
    let router = SessionRouter::new(RouterConfig::new(vec![log_route("/chats/:id", &log)]));

    let (_socket, tx, task) = spawn_connection(&router, "/chats/42?user=alice");
    settle().await;

    assert_eq!(log.last_room.lock().unwrap().as_deref(), Some("42"));

    tx.send(close_event()).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn unmatched_path_gets_not_found() {
    let log = Arc::new(HookLog::default());
    let router = SessionRouter::new(RouterConfig::new(vec![log_route("/room", &log)]));

    let (socket, tx, task) = spawn_connection(&router, "/nope");
    settle().await;

    assert_eq!(first_error_code(&socket), Some(4404));
    assert_eq!(router.controller_count(), 0);
    assert_eq!(log.created.load(Ordering::SeqCst), 0);

    tx.send(close_event()).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn non_closing_admission_error_keeps_connection_open() {
    let log = Arc::new(HookLog::default());
    let router = SessionRouter::new(RouterConfig::new(vec![log_route("/room", &log)]));

    let (socket, tx, task) = spawn_connection(&router, "/nope");
    settle().await;

    // In-band frame only; the peer decides when to hang up.
    assert_eq!(first_error_code(&socket), Some(4404));
    assert_eq!(socket.close_code(), None);
    assert!(socket.is_open());
    assert!(!task.is_finished());

    tx.send(close_event()).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn prefix_is_stripped_before_matching() {
    let log = Arc::new(HookLog::default());
    let router = SessionRouter::new(RouterConfig {
        routes: vec![log_route("/room", &log)],
        prefix_path: Some("/ws".to_string()),
        ..RouterConfig::default()
    });

    let (_socket, tx, task) = spawn_connection(&router, "/ws/room");
    settle().await;
    assert_eq!(log.connects.load(Ordering::SeqCst), 1);

    tx.send(close_event()).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn router_guard_denies_before_instance_creation() {
    let log = Arc::new(HookLog::default());
    let router = SessionRouter::new(RouterConfig {
        routes: vec![log_route("/room", &log)],
        connect_guards: vec![Arc::new(DenyGuard)],
        ..RouterConfig::default()
    });

    let (socket, tx, task) = spawn_connection(&router, "/room");
    settle().await;

    assert_eq!(first_error_code(&socket), Some(4403));
    assert_eq!(router.controller_count(), 0);
    assert_eq!(log.created.load(Ordering::SeqCst), 0);

    tx.send(close_event()).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn instance_guard_denial_leaves_connection_attached() {
    let log = Arc::new(HookLog::default());
    let router = SessionRouter::new(RouterConfig::new(vec![
        log_route("/room", &log).guard(DenyGuard),
    ]));

    let (socket, tx, task) = spawn_connection(&router, "/room");
    settle().await;

    assert_eq!(first_error_code(&socket), Some(4403));
    // Denied after attach: counted until its close event arrives.
    let controller = router.controller("/room").expect("instance exists");
    assert_eq!(controller.connection_count(), 1);
    assert_eq!(log.connects.load(Ordering::SeqCst), 0);

    tx.send(close_event()).unwrap();
    task.await.unwrap();
    assert_eq!(router.controller_count(), 0);
    assert_eq!(log.destroys.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn capacity_rejection_precedes_guards() {
    let log = Arc::new(HookLog::default());
    let hits = Arc::new(AtomicUsize::new(0));
    let route = log_route("/room", &log)
        .guard(CountingGuard {
            hits: Arc::clone(&hits),
        })
        .rate_limit(RateLimitConfig {
            max_requests: None,
            max_connections: Some(1),
        });
    let router = SessionRouter::new(RouterConfig::new(vec![route]));

    let (_s1, tx1, task1) = spawn_connection(&router, "/room");
    settle().await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let (s2, tx2, task2) = spawn_connection(&router, "/room");
    settle().await;

    assert_eq!(first_error_code(&s2), Some(4503));
    // The rejected connection never attached and never reached the guard.
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    let controller = router.controller("/room").expect("instance exists");
    assert_eq!(controller.connection_count(), 1);

    tx2.send(close_event()).unwrap();
    task2.await.unwrap();
    tx1.send(close_event()).unwrap();
    task1.await.unwrap();
}

#[tokio::test]
async fn rejected_connection_traffic_is_ignored() {
    let log = Arc::new(HookLog::default());
    let route = log_route("/room", &log).rate_limit(RateLimitConfig {
        max_requests: None,
        max_connections: Some(1),
    });
    let router = SessionRouter::new(RouterConfig::new(vec![route]));

    let (_s1, tx1, task1) = spawn_connection(&router, "/room");
    settle().await;
    let (s2, tx2, task2) = spawn_connection(&router, "/room");
    settle().await;
    assert_eq!(first_error_code(&s2), Some(4503));

    // Frames from the never-attached connection must not reach the hooks.
    tx2.send(text_event("smuggled")).unwrap();
    settle().await;
    assert!(log.messages.lock().unwrap().is_empty());

    tx2.send(close_event()).unwrap();
    task2.await.unwrap();
    assert_eq!(log.closes.load(Ordering::SeqCst), 0);
    assert_eq!(log.destroys.load(Ordering::SeqCst), 0);
    assert_eq!(router.controller_count(), 1);

    tx1.send(close_event()).unwrap();
    task1.await.unwrap();
    assert_eq!(log.closes.load(Ordering::SeqCst), 1);
    assert_eq!(log.destroys.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn global_capacity_rejects_before_global_guards() {
    let log = Arc::new(HookLog::default());
    let hits = Arc::new(AtomicUsize::new(0));
    let router = SessionRouter::new(RouterConfig {
        routes: vec![log_route("/room", &log)],
        connect_guards: vec![Arc::new(CountingGuard {
            hits: Arc::clone(&hits),
        })],
        rate_limit: Some(RateLimitConfig {
            max_requests: None,
            max_connections: Some(1),
        }),
        ..RouterConfig::default()
    });

    let (_s1, tx1, task1) = spawn_connection(&router, "/room");
    settle().await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let (s2, tx2, task2) = spawn_connection(&router, "/room");
    settle().await;

    assert_eq!(first_error_code(&s2), Some(4503));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(router.controller("/room").unwrap().connection_count(), 1);

    tx2.send(close_event()).unwrap();
    task2.await.unwrap();
    tx1.send(close_event()).unwrap();
    task1.await.unwrap();
}

#[tokio::test]
async fn concurrent_attaches_never_exceed_capacity() {
    let log = Arc::new(HookLog::default());
    let route = log_route("/room", &log).rate_limit(RateLimitConfig {
        max_requests: None,
        max_connections: Some(3),
    });
    let router = SessionRouter::new(RouterConfig::new(vec![route]));

    let connections: Vec<_> = (0..10)
        .map(|_| spawn_connection(&router, "/room"))
        .collect();
    settle().await;

    let controller = router.controller("/room").expect("instance exists");
    assert_eq!(controller.connection_count(), 3);
    assert_eq!(log.connects.load(Ordering::SeqCst), 3);

    for (_socket, tx, task) in connections {
        tx.send(close_event()).unwrap();
        task.await.unwrap();
    }
    assert_eq!(router.controller_count(), 0);
    assert_eq!(log.destroys.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_churn_destroys_every_instance_exactly_once() {
    let log = Arc::new(HookLog::default());
    let router = SessionRouter::new(RouterConfig::new(vec![log_route("/room", &log)]));

    // Overlapping connect/close cycles race instance creation against
    // destruction under the same resolved path.
    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let (_socket, tx, task) = spawn_connection(&router, "/room");
            tx.send(close_event()).unwrap();
            task
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }
    settle().await;

    assert_eq!(router.controller_count(), 0);
    let created = log.created.load(Ordering::SeqCst);
    assert!(created >= 1);
    assert_eq!(created, log.destroys.load(Ordering::SeqCst));
}

#[tokio::test]
async fn third_message_in_window_closes_with_4429() {
    let log = Arc::new(HookLog::default());
    let route = log_route("/room", &log).rate_limit(RateLimitConfig {
        max_requests: Some(MaxRequests {
            counter: 2,
            window_ms: 60_000,
        }),
        max_connections: None,
    });
    let router = SessionRouter::new(RouterConfig::new(vec![route]));

    let (socket, tx, task) = spawn_connection(&router, "/room");
    settle().await;

    tx.send(text_event("one")).unwrap();
    tx.send(text_event("two")).unwrap();
    tx.send(text_event("three")).unwrap();
    settle().await;

    assert_eq!(log.messages.lock().unwrap().as_slice(), ["one", "two"]);
    assert_eq!(socket.close_code(), Some(4429));

    tx.send(close_event()).unwrap();
    task.await.unwrap();
}

struct FailMarkedPipe;

#[async_trait]
impl Pipe for FailMarkedPipe {
    async fn transform(
        &self,
        value: Payload,
        ctx: &ConnectionContext,
    ) -> Result<Payload, SessionError> {
        if ctx.query().contains_key("fail") {
            return Err(SessionError::bad_request("Marked to fail"));
        }
        Ok(value)
    }
}

struct EchoAllHandler;

#[async_trait]
impl Handler for EchoAllHandler {
    async fn on_message(
        &self,
        instance: &Arc<Controller>,
        message: Payload,
        _ctx: &Arc<ConnectionContext>,
    ) -> Result<(), SessionError> {
        instance.broadcast(message).await;
        Ok(())
    }
}

#[tokio::test]
async fn broadcast_survives_one_failing_response_pipe() {
    let router = SessionRouter::new(RouterConfig::new(vec![
        Route::new("/cast", || EchoAllHandler).response_pipe(FailMarkedPipe),
    ]));

    let (s1, tx1, task1) = spawn_connection(&router, "/cast?n=1");
    let (s2, tx2, task2) = spawn_connection(&router, "/cast?n=2");
    let (s3, tx3, task3) = spawn_connection(&router, "/cast?fail=1");
    settle().await;

    tx1.send(text_event("hello")).unwrap();
    settle().await;

    assert_eq!(s1.sent(), ["hello"]);
    assert_eq!(s2.sent(), ["hello"]);
    assert_eq!(first_error_code(&s3), Some(4400));

    for (tx, task) in [(tx1, task1), (tx2, task2), (tx3, task3)] {
        tx.send(close_event()).unwrap();
        task.await.unwrap();
    }
}

struct RelayHandler;

#[async_trait]
impl Handler for RelayHandler {
    async fn on_init(&self, instance: &Arc<Controller>) -> Result<(), SessionError> {
        let weak = Arc::downgrade(instance);
        instance.subscribe(move |data| {
            if let Some(controller) = weak.upgrade() {
                let payload = Payload::Json(data.clone());
                tokio::spawn(async move { controller.broadcast(payload).await });
            }
            Ok(())
        });
        Ok(())
    }
}

struct PublishHandler;

#[async_trait]
impl Handler for PublishHandler {
    async fn on_message(
        &self,
        instance: &Arc<Controller>,
        _message: Payload,
        _ctx: &Arc<ConnectionContext>,
    ) -> Result<(), SessionError> {
        instance.publish("/feed", &json!({ "ping": 1 }));
        Ok(())
    }
}

#[tokio::test]
async fn publish_reaches_subscribers_on_other_paths() {
    let router = SessionRouter::new(RouterConfig::new(vec![
        Route::new("/feed", || RelayHandler),
        Route::new("/source", || PublishHandler),
    ]));

    let (subscriber, sub_tx, sub_task) = spawn_connection(&router, "/feed");
    let (_publisher, pub_tx, pub_task) = spawn_connection(&router, "/source");
    settle().await;

    pub_tx.send(text_event("go")).unwrap();
    settle().await;

    let frames = subscriber.sent();
    assert_eq!(frames.len(), 1);
    let value: Value = serde_json::from_str(&frames[0]).unwrap();
    assert_eq!(value["ping"], 1);

    // External callers can push into the same fan-out.
    router.notify_path("/feed", &json!({ "ping": 2 }));
    settle().await;
    let frames = subscriber.sent();
    assert_eq!(frames.len(), 2);

    sub_tx.send(close_event()).unwrap();
    sub_task.await.unwrap();
    pub_tx.send(close_event()).unwrap();
    pub_task.await.unwrap();
}
