use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use escape_room_server::config::ServerConfig;
use escape_room_server::constants::TICK_MS;
use escape_room_server::engine::{EngineConfig, GameEngine};
use escape_room_server::error::{EngineError, PersistenceError};
use escape_room_server::http_api::{self, ApiState};
use escape_room_server::progress_store::{ProgressStore, SharedProgressStore, StoreBackend};
use escape_room_server::script::StoryScript;
use escape_room_server::server_protocol::{parse_client_message, ParsedClientMessage};
use escape_room_server::server_utils::{room_id_or_default, session_user_id};
use escape_room_server::timer::{Clock, SystemClock};
use escape_room_server::types::GameEvent;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tower_http::services::{ServeDir, ServeFile};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

type SharedState = Arc<Mutex<ServerState>>;
type PlayerEngine = GameEngine<StoreBackend>;

struct ClientContext {
    tx: mpsc::Sender<OutboundMessage>,
    user_id: Option<String>,
    engine: Option<PlayerEngine>,
}

#[derive(Clone, Debug)]
enum OutboundMessage {
    Text(String),
    Close { code: u16, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueuePolicy {
    DropOnFull,
    DisconnectOnFull,
}

struct ServerState {
    clients: HashMap<String, ClientContext>,
    script: Arc<StoryScript>,
    store: SharedProgressStore,
    clock: Arc<dyn Clock>,
    session_cookie: String,
}

impl ServerState {
    fn new(script: Arc<StoryScript>, store: SharedProgressStore, session_cookie: String) -> Self {
        Self {
            clients: HashMap::new(),
            script,
            store,
            clock: Arc::new(SystemClock::new()),
            session_cookie,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = ServerConfig::from_env();

    let script = match &config.story_script_path {
        Some(path) => StoryScript::load(path)
            .with_context(|| format!("failed to load story script {}", path.display()))?,
        None => StoryScript::samsung_sds().context("built-in story script is invalid")?,
    };
    let store = ProgressStore::new(config.progress_db_path.clone()).into_shared();

    let state = Arc::new(Mutex::new(ServerState::new(
        Arc::new(script),
        store.clone(),
        config.session_cookie.clone(),
    )));
    start_tick_loop(state.clone());

    let api = http_api::router(ApiState {
        store,
        session_cookie: config.session_cookie.clone(),
    });
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws_handler))
        .with_state(state)
        .merge(api);

    let app = if let Some(static_dir) = config.resolve_static_dir() {
        let index_file = static_dir.join("index.html");
        info!(path = %static_dir.display(), "serving static files");
        app.fallback_service(ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)))
    } else {
        warn!("static file root not found; serving API and websocket only");
        app
    };

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    info!(port = config.port, "listening");
    axum::serve(listener, app)
        .await
        .context("server runtime failed")?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    let user_id = {
        let guard = state.lock().await;
        session_user_id(&headers, &guard.session_cookie)
    };
    ws.on_upgrade(move |socket| handle_socket(state, socket, user_id))
}

async fn handle_socket(state: SharedState, socket: WebSocket, user_id: Option<String>) {
    let client_id = make_id("client");
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(256);

    {
        let mut guard = state.lock().await;
        guard.clients.insert(
            client_id.clone(),
            ClientContext {
                tx: tx.clone(),
                user_id: user_id.clone(),
                engine: None,
            },
        );
    }
    info!(client_id = %client_id, user_id = ?user_id, "client connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let should_close = matches!(outbound, OutboundMessage::Close { .. });
            let result = match outbound {
                OutboundMessage::Text(payload) => {
                    ws_sender.send(Message::Text(payload.into())).await
                }
                OutboundMessage::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    ws_sender.send(Message::Close(Some(frame))).await
                }
            };
            if result.is_err() || should_close {
                break;
            }
        }
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        match message {
            Message::Text(raw) => {
                handle_client_message(state.clone(), &client_id, raw.to_string()).await;
            }
            Message::Binary(raw) => {
                if let Ok(text) = String::from_utf8(raw.to_vec()) {
                    handle_client_message(state.clone(), &client_id, text).await;
                } else {
                    send_error_to_client(&state, &client_id, "invalid utf8 message").await;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    handle_disconnect(state, &client_id).await;
    drop(tx);
    let _ = writer.await;
}

async fn handle_client_message(state: SharedState, client_id: &str, raw: String) {
    let Some(message) = parse_client_message(&raw) else {
        send_error_to_client(&state, client_id, "invalid message").await;
        return;
    };

    let mut guard = state.lock().await;
    match message {
        ParsedClientMessage::Hello { room_id } => {
            handle_hello(&mut guard, client_id, room_id.as_deref());
        }
        ParsedClientMessage::Ping { t } => {
            send_to_client(
                &mut guard,
                client_id,
                &json!({
                    "type": "pong",
                    "t": t,
                }),
                QueuePolicy::DisconnectOnFull,
            );
        }
        ParsedClientMessage::TextComplete { step_id } => {
            apply_to_engine(&mut guard, client_id, |engine| {
                engine.text_complete(&step_id);
                Ok(())
            });
        }
        ParsedClientMessage::AnswerDraft { text } => {
            apply_to_engine(&mut guard, client_id, |engine| {
                engine.set_answer_draft(&text);
                Ok(())
            });
        }
        ParsedClientMessage::SubmitAnswer => {
            apply_to_engine(&mut guard, client_id, |engine| {
                engine.submit_answer();
                Ok(())
            });
        }
        ParsedClientMessage::SelectChoice { key } => {
            apply_to_engine(&mut guard, client_id, |engine| {
                engine.select_choice(&key);
                Ok(())
            });
        }
        ParsedClientMessage::Retry => {
            apply_to_engine(&mut guard, client_id, |engine| engine.retry());
        }
        ParsedClientMessage::UseHint => {
            apply_to_engine(&mut guard, client_id, |engine| {
                engine.use_hint();
                Ok(())
            });
        }
        ParsedClientMessage::CompleteGame => {
            apply_to_engine(&mut guard, client_id, |engine| {
                engine.complete_game().map(|_| ())
            });
        }
        ParsedClientMessage::Reset => {
            apply_to_engine(&mut guard, client_id, |engine| engine.reset());
        }
        ParsedClientMessage::Pause => {
            apply_to_engine(&mut guard, client_id, |engine| {
                engine.pause();
                Ok(())
            });
        }
        ParsedClientMessage::Resume => {
            apply_to_engine(&mut guard, client_id, |engine| {
                engine.resume();
                Ok(())
            });
        }
        ParsedClientMessage::Leave => {
            apply_to_engine(&mut guard, client_id, |engine| {
                engine.leave();
                Ok(())
            });
        }
    }
}

fn handle_hello(state: &mut ServerState, client_id: &str, requested_room_id: Option<&str>) {
    let Some(room_id) = room_id_or_default(requested_room_id) else {
        send_to_client(
            state,
            client_id,
            &json!({
                "type": "error",
                "message": "invalid room id",
            }),
            QueuePolicy::DisconnectOnFull,
        );
        return;
    };
    let Some(user_id) = state.clients.get(client_id).map(|ctx| ctx.user_id.clone()) else {
        return;
    };

    if let Some(previous) = state
        .clients
        .get_mut(client_id)
        .and_then(|ctx| ctx.engine.as_mut())
    {
        previous.leave();
    }

    let backend = StoreBackend::new(state.store.clone(), user_id.clone());
    let mut engine = GameEngine::new(
        Arc::clone(&state.script),
        backend,
        Arc::clone(&state.clock),
        &room_id,
        EngineConfig::default(),
    );
    let init_error = engine.initialize().err();

    send_to_client(
        state,
        client_id,
        &json!({
            "type": "welcome",
            "clientId": client_id,
            "roomId": room_id,
            "userId": user_id,
            "stepCount": state.script.len(),
        }),
        QueuePolicy::DisconnectOnFull,
    );
    if let Some(error) = init_error {
        report_engine_error(state, client_id, &error);
    }

    if let Some(ctx) = state.clients.get_mut(client_id) {
        ctx.engine = Some(engine);
    }
    send_state(state, client_id, QueuePolicy::DisconnectOnFull);
}

/// Runs a player action and pushes the resulting state immediately.
fn apply_to_engine(
    state: &mut ServerState,
    client_id: &str,
    action: impl FnOnce(&mut PlayerEngine) -> Result<(), EngineError>,
) {
    let result = match state
        .clients
        .get_mut(client_id)
        .and_then(|ctx| ctx.engine.as_mut())
    {
        Some(engine) => action(engine),
        None => {
            send_to_client(
                state,
                client_id,
                &json!({
                    "type": "error",
                    "message": "send hello first",
                }),
                QueuePolicy::DisconnectOnFull,
            );
            return;
        }
    };
    if let Err(error) = result {
        report_engine_error(state, client_id, &error);
    }
    send_state(state, client_id, QueuePolicy::DisconnectOnFull);
}

fn report_engine_error(state: &mut ServerState, client_id: &str, error: &EngineError) {
    match error {
        EngineError::Persistence(PersistenceError::Unauthenticated) => {
            // The snapshot carries the login prompt event.
            debug!(client_id, "session is not signed in");
        }
        EngineError::Persistence(inner) => {
            warn!(client_id, error = %inner, "persistence request failed");
            send_to_client(
                state,
                client_id,
                &json!({
                    "type": "error",
                    "message": inner.to_string(),
                }),
                QueuePolicy::DisconnectOnFull,
            );
        }
        EngineError::NotOnSuccessStep(_) => {
            send_to_client(
                state,
                client_id,
                &json!({
                    "type": "error",
                    "message": error.to_string(),
                }),
                QueuePolicy::DisconnectOnFull,
            );
        }
        EngineError::Script(inner) => {
            error!(client_id, error = %inner, "story script mismatch; closing game session");
            if let Some(ctx) = state.clients.get_mut(client_id) {
                ctx.engine = None;
            }
            send_to_client(
                state,
                client_id,
                &json!({
                    "type": "error",
                    "message": "story script error",
                }),
                QueuePolicy::DisconnectOnFull,
            );
        }
    }
}

/// Sends the client's snapshot together with the events raised since the
/// previous one. Torn-down engines are released after their last snapshot.
fn send_state(state: &mut ServerState, client_id: &str, policy: QueuePolicy) {
    let Some(ctx) = state.clients.get_mut(client_id) else {
        return;
    };
    let Some(engine) = ctx.engine.as_mut() else {
        return;
    };
    let snapshot = engine.build_snapshot(true);
    let torn_down = engine.is_torn_down();
    if torn_down {
        ctx.engine = None;
    }
    let login_required = snapshot
        .events
        .iter()
        .any(|event| *event == GameEvent::LoginRequired);

    if login_required {
        send_to_client(
            state,
            client_id,
            &json!({ "type": "login_required" }),
            QueuePolicy::DisconnectOnFull,
        );
    }
    send_to_client(
        state,
        client_id,
        &json!({
            "type": "state",
            "snapshot": snapshot,
        }),
        policy,
    );
    if torn_down {
        debug!(client_id, "game session closed");
    }
}

async fn handle_disconnect(state: SharedState, client_id: &str) {
    let mut guard = state.lock().await;
    disconnect_client_internal(&mut guard, client_id);
}

fn disconnect_client_internal(state: &mut ServerState, client_id: &str) {
    let Some(mut context) = state.clients.remove(client_id) else {
        return;
    };
    if let Some(engine) = context.engine.as_mut() {
        engine.leave();
    }
    let _ = context.tx.try_send(OutboundMessage::Close {
        code: 1000,
        reason: "session closed".to_string(),
    });
    info!(client_id, user_id = ?context.user_id, "client disconnected");
}

fn start_tick_loop(state: SharedState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(TICK_MS));
        loop {
            interval.tick().await;
            let mut guard = state.lock().await;
            tick_sessions(&mut guard);
        }
    });
}

fn tick_sessions(state: &mut ServerState) {
    let client_ids: Vec<String> = state
        .clients
        .iter()
        .filter(|(_, ctx)| ctx.engine.is_some())
        .map(|(id, _)| id.clone())
        .collect();

    for client_id in client_ids {
        let result = match state
            .clients
            .get_mut(&client_id)
            .and_then(|ctx| ctx.engine.as_mut())
        {
            Some(engine) => engine.poll(),
            None => continue,
        };
        if let Err(error) = result {
            report_engine_error(state, &client_id, &error);
        }
        send_state(state, &client_id, QueuePolicy::DropOnFull);
    }
}

fn send_to_client(state: &mut ServerState, client_id: &str, message: &Value, policy: QueuePolicy) {
    let send_failed = if let Some(client) = state.clients.get(client_id) {
        client
            .tx
            .try_send(OutboundMessage::Text(message.to_string()))
            .is_err()
    } else {
        false
    };
    if send_failed && policy == QueuePolicy::DisconnectOnFull {
        disconnect_client_internal(state, client_id);
    }
}

async fn send_error_to_client(state: &SharedState, client_id: &str, message: &str) {
    let mut guard = state.lock().await;
    send_to_client(
        &mut guard,
        client_id,
        &json!({
            "type": "error",
            "message": message,
        }),
        QueuePolicy::DisconnectOnFull,
    );
}

fn make_id(prefix: &str) -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{seq}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> ServerState {
        let script = StoryScript::samsung_sds().expect("built-in script");
        ServerState::new(
            Arc::new(script),
            ProgressStore::in_memory().into_shared(),
            "escape_session".to_string(),
        )
    }

    fn connect(
        state: &mut ServerState,
        client_id: &str,
        user_id: Option<&str>,
        capacity: usize,
    ) -> mpsc::Receiver<OutboundMessage> {
        let (tx, rx) = mpsc::channel(capacity);
        state.clients.insert(
            client_id.to_string(),
            ClientContext {
                tx,
                user_id: user_id.map(str::to_string),
                engine: None,
            },
        );
        rx
    }

    fn drain_types(rx: &mut mpsc::Receiver<OutboundMessage>) -> Vec<String> {
        let mut types = Vec::new();
        while let Ok(outbound) = rx.try_recv() {
            if let OutboundMessage::Text(payload) = outbound {
                let value: Value = serde_json::from_str(&payload).expect("json payload");
                types.push(value["type"].as_str().unwrap_or_default().to_string());
            }
        }
        types
    }

    #[test]
    fn hello_starts_a_game_session() {
        let mut state = test_state();
        let mut rx = connect(&mut state, "client_1", Some("u1"), 16);
        handle_hello(&mut state, "client_1", None);

        assert_eq!(drain_types(&mut rx), vec!["welcome", "state"]);
        let engine = state.clients["client_1"].engine.as_ref().expect("engine");
        assert!(engine.is_initialized());
        assert_eq!(engine.room_id(), "samsung-sds");
    }

    #[test]
    fn hello_without_session_asks_for_login() {
        let mut state = test_state();
        let mut rx = connect(&mut state, "client_1", None, 16);
        handle_hello(&mut state, "client_1", Some("samsung-sds"));

        assert_eq!(drain_types(&mut rx), vec!["welcome", "login_required", "state"]);
        assert!(state.clients["client_1"].engine.is_some());
    }

    #[test]
    fn hello_rejects_invalid_room_id() {
        let mut state = test_state();
        let mut rx = connect(&mut state, "client_1", Some("u1"), 16);
        handle_hello(&mut state, "client_1", Some("../etc"));

        assert_eq!(drain_types(&mut rx), vec!["error"]);
        assert!(state.clients["client_1"].engine.is_none());
    }

    #[test]
    fn actions_before_hello_are_rejected() {
        let mut state = test_state();
        let mut rx = connect(&mut state, "client_1", Some("u1"), 16);
        apply_to_engine(&mut state, "client_1", |engine| {
            engine.use_hint();
            Ok(())
        });
        assert_eq!(drain_types(&mut rx), vec!["error"]);
    }

    #[test]
    fn completing_early_reports_an_error_and_keeps_the_session() {
        let mut state = test_state();
        let mut rx = connect(&mut state, "client_1", Some("u1"), 16);
        handle_hello(&mut state, "client_1", None);
        drain_types(&mut rx);

        apply_to_engine(&mut state, "client_1", |engine| {
            engine.complete_game().map(|_| ())
        });
        assert_eq!(drain_types(&mut rx), vec!["error", "state"]);
        assert!(state.clients["client_1"].engine.is_some());
    }

    #[test]
    fn full_queue_disconnects_only_when_policy_requires_it() {
        let mut state = test_state();
        let _rx = connect(&mut state, "client_1", Some("u1"), 1);
        let message = json!({ "type": "pong" });

        send_to_client(&mut state, "client_1", &message, QueuePolicy::DropOnFull);
        send_to_client(&mut state, "client_1", &message, QueuePolicy::DropOnFull);
        assert!(state.clients.contains_key("client_1"));

        send_to_client(&mut state, "client_1", &message, QueuePolicy::DisconnectOnFull);
        assert!(!state.clients.contains_key("client_1"));
    }

    #[test]
    fn ids_are_unique_per_prefix() {
        let first = make_id("client");
        let second = make_id("client");
        assert!(first.starts_with("client_"));
        assert_ne!(first, second);
    }
}
