//! Chat server demo built on the session router.
//!
//! Routes:
//! - `/chats` — room directory; any message returns the list of rooms
//!   that have seen traffic
//! - `/chats/:id` — one chat room per id; messages are broadcast to
//!   every member and activity is published to `/chats/unread`
//! - `/chats/unread` — activity feed; subscribers receive a ping
//!   whenever any room gets a message
//!
//! Connect with a `user` query parameter, e.g.
//! `ws://localhost:8080/chats/42?user=alice`.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use clap::Parser;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use switchboard::config::{loader, ServerConfig};
use switchboard::controller::{ConnectionContext, Controller, Handler};
use switchboard::error::SessionError;
use switchboard::guard::Guard;
use switchboard::message::Payload;
use switchboard::observability::{logging, metrics};
use switchboard::pipe::commons::{JsonParsePipe, JsonStringifyPipe, Utf8Pipe};
use switchboard::routing::{Route, RouterConfig, SessionRouter};

#[derive(Parser, Debug)]
#[command(name = "switchboard", about = "WebSocket session router demo")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Identity attached to a connection by [`UserGuard`].
#[derive(Debug, Clone)]
struct User {
    name: String,
}

/// Admits only connections identifying themselves via the `x-user` header
/// or a `user` query parameter, and stashes the identity on the context
/// for the handlers.
struct UserGuard;

#[async_trait]
impl Guard for UserGuard {
    async fn allow(&self, ctx: &ConnectionContext) -> Result<bool, SessionError> {
        let name = ctx
            .meta()
            .header("x-user")
            .map(str::to_string)
            .or_else(|| ctx.query().get("user").cloned());
        let Some(name) = name else {
            return Ok(false);
        };
        ctx.set_payload(User { name });
        Ok(true)
    }
}

/// Rooms that have seen at least one message, shared across instances.
type RoomIndex = Arc<Mutex<BTreeSet<String>>>;

/// `/chats` — replies to any message with the current room list.
struct DirectoryHandler {
    rooms: RoomIndex,
}

#[async_trait]
impl Handler for DirectoryHandler {
    async fn on_message(
        &self,
        instance: &Arc<Controller>,
        _message: Payload,
        ctx: &Arc<ConnectionContext>,
    ) -> Result<(), SessionError> {
        let rooms: Vec<String> = self
            .rooms
            .lock()
            .expect("room index mutex poisoned")
            .iter()
            .cloned()
            .collect();
        instance
            .send(ctx, Payload::Json(json!({ "event": "rooms", "rooms": rooms })))
            .await;
        Ok(())
    }
}

/// `/chats/:id` — broadcasts messages to the room and reports activity.
struct RoomHandler {
    rooms: RoomIndex,
}

#[async_trait]
impl Handler for RoomHandler {
    async fn on_connect(
        &self,
        instance: &Arc<Controller>,
        ctx: &Arc<ConnectionContext>,
    ) -> Result<(), SessionError> {
        let user = ctx
            .payload::<User>()
            .map(|u| u.name.clone())
            .unwrap_or_else(|| "anonymous".to_string());
        instance
            .broadcast(Payload::Json(json!({ "event": "joined", "user": user })))
            .await;
        Ok(())
    }

    async fn on_message(
        &self,
        instance: &Arc<Controller>,
        message: Payload,
        ctx: &Arc<ConnectionContext>,
    ) -> Result<(), SessionError> {
        let Payload::Json(value) = message else {
            return Err(SessionError::bad_request("Expected a JSON message"));
        };
        let text = value
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| SessionError::bad_request("Missing text field"))?;

        let room = instance.params().get("id").cloned().unwrap_or_default();
        let user = ctx
            .payload::<User>()
            .map(|u| u.name.clone())
            .unwrap_or_else(|| "anonymous".to_string());

        self.rooms
            .lock()
            .expect("room index mutex poisoned")
            .insert(room.clone());

        instance
            .broadcast(Payload::Json(json!({
                "event": "message",
                "room": room,
                "user": user,
                "text": text,
            })))
            .await;
        instance.publish("/chats/unread", &json!({ "event": "activity", "room": room }));
        Ok(())
    }
}

/// `/chats/unread` — relays activity pings from the rooms to its members.
struct UnreadHandler;

#[async_trait]
impl Handler for UnreadHandler {
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

fn routes(rooms: RoomIndex) -> Vec<Route> {
    let directory_rooms = Arc::clone(&rooms);
    let room_rooms = Arc::clone(&rooms);

    vec![
        Route::new("/chats", move || DirectoryHandler {
            rooms: Arc::clone(&directory_rooms),
        })
        .guard(UserGuard)
        .response_pipe(JsonStringifyPipe),
        // Registered before the parameter route so it wins the match.
        Route::new("/chats/unread", || UnreadHandler)
            .guard(UserGuard)
            .response_pipe(JsonStringifyPipe),
        Route::new("/chats/:id", move || RoomHandler {
            rooms: Arc::clone(&room_rooms),
        })
        .guard(UserGuard)
        .request_pipe(Utf8Pipe)
        .request_pipe(JsonParsePipe)
        .response_pipe(JsonStringifyPipe),
    ]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => loader::load_config(path)?,
        None => ServerConfig::default(),
    };

    logging::init(&config.observability.log_level);
    tracing::info!(
        bind_address = %config.listener.bind_address,
        prefix_path = config.prefix_path.as_deref().unwrap_or("/"),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let rooms: RoomIndex = Arc::new(Mutex::new(BTreeSet::new()));
    let router = SessionRouter::new(RouterConfig {
        routes: routes(rooms),
        prefix_path: config.prefix_path.clone(),
        rate_limit: Some(config.rate_limit.clone()),
        ..RouterConfig::default()
    });

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    switchboard::net::serve(router, listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
