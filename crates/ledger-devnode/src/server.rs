//! WebSocket event endpoint.
//!
//! One [`WebSocketHandler`] per connection. Responses and event pushes share
//! the connection's outbox, so a subscribe response always reaches the
//! client before the first event of that subscription.

use crate::connection::ConnectionId;
use crate::subscriptions::{SubscribeError, SubscriptionManager};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use ledger_types::{SubscriptionId, Topic};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Path of the event endpoint.
pub const WS_PATH: &str = "/websocket";

/// Frames queued per connection before events are dropped.
pub const OUTBOX_CAPACITY: usize = 1024;

/// How long a closing connection may take to flush its outbox.
const WRITER_GRACE: Duration = Duration::from_secs(1);

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const SERVER_ERROR: i32 = -32000;

/// Shared state of the endpoint.
#[derive(Clone)]
pub struct AppState {
    pub subscriptions: Arc<SubscriptionManager>,
    pub max_message_size: usize,
    pub shutdown: watch::Receiver<bool>,
}

/// Build the endpoint router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(WS_PATH, get(ws_upgrade))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| WebSocketHandler::new(state).handle(socket))
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "connections": state.subscriptions.connection_count(),
        "subscriptions": state.subscriptions.total_subscriptions(),
    }))
}

/// WebSocket connection handler
pub struct WebSocketHandler {
    subscriptions: Arc<SubscriptionManager>,
    connection_id: ConnectionId,
    max_message_size: usize,
    shutdown: watch::Receiver<bool>,
}

impl WebSocketHandler {
    pub fn new(state: AppState) -> Self {
        Self {
            subscriptions: state.subscriptions,
            connection_id: ConnectionId::new(),
            max_message_size: state.max_message_size,
            shutdown: state.shutdown,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Check message size, returns error response if too large
    fn check_message_size(&self, size: usize) -> Option<String> {
        if size > self.max_message_size {
            warn!(
                connection_id = %self.connection_id,
                size = size,
                max = self.max_message_size,
                "Message exceeds size limit"
            );
            Some(json_rpc_error(
                None,
                INVALID_REQUEST,
                &format!(
                    "Message too large: {} bytes (max: {})",
                    size, self.max_message_size
                ),
            ))
        } else {
            None
        }
    }

    /// Handle a WebSocket connection until the peer leaves or the node
    /// shuts down.
    pub async fn handle(self, socket: WebSocket) {
        info!(connection_id = %self.connection_id, "New WebSocket connection");

        let (mut sink, mut stream) = socket.split();
        let (outbox, mut outbox_rx) = mpsc::channel::<String>(OUTBOX_CAPACITY);
        self.subscriptions
            .register_connection(self.connection_id, outbox.clone());

        let connection_id = self.connection_id;
        let mut writer = tokio::spawn(async move {
            while let Some(frame) = outbox_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(frame)).await {
                    debug!(connection_id = %connection_id, error = %e, "WebSocket send failed");
                    return;
                }
            }
            let _ = sink.send(Message::Close(None)).await;
        });

        let mut shutdown = self.shutdown.clone();
        loop {
            let next = tokio::select! {
                next = stream.next() => next,
                _ = shutdown.wait_for(|stopped| *stopped) => {
                    debug!(connection_id = %self.connection_id, "Closing connection on shutdown");
                    break;
                }
            };

            let text = match next {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => text,
                    Err(_) => {
                        let error = json_rpc_error(None, PARSE_ERROR, "Parse error: binary frame is not UTF-8");
                        if outbox.send(error).await.is_err() {
                            break;
                        }
                        continue;
                    }
                },
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => {
                    debug!(connection_id = %self.connection_id, "WebSocket close received");
                    break;
                }
                Some(Err(e)) => {
                    warn!(connection_id = %self.connection_id, error = %e, "WebSocket error");
                    break;
                }
            };

            let response = match self.check_message_size(text.len()) {
                Some(error_response) => error_response,
                None => self.handle_message(&text),
            };
            if outbox.send(response).await.is_err() {
                break;
            }
        }

        // Cleanup subscriptions on disconnect; the writer drains and closes
        // once the last outbox sender is gone.
        self.subscriptions.remove_connection(&self.connection_id);
        drop(outbox);
        if tokio::time::timeout(WRITER_GRACE, &mut writer).await.is_err() {
            writer.abort();
        }

        info!(connection_id = %self.connection_id, "WebSocket connection closed");
    }

    /// Handle a single JSON-RPC message
    pub fn handle_message(&self, text: &str) -> String {
        let request: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                return json_rpc_error(None, PARSE_ERROR, &format!("Parse error: {}", e));
            }
        };

        let id = request.get("id").cloned();
        let method = request.get("method").and_then(|m| m.as_str()).unwrap_or("");
        let params = request.get("params");

        match method {
            "subscribe" => self.handle_subscribe(id, params),
            "unsubscribe" => self.handle_unsubscribe(id, params),
            _ => json_rpc_error(id, METHOD_NOT_FOUND, &format!("Method not found: {}", method)),
        }
    }

    fn handle_subscribe(&self, id: Option<Value>, params: Option<&Value>) -> String {
        let event = match params.and_then(|p| p.get("event")).and_then(|e| e.as_str()) {
            Some(event) => event,
            None => {
                return json_rpc_error(id, INVALID_PARAMS, "Invalid params: missing event name");
            }
        };

        match self
            .subscriptions
            .subscribe(self.connection_id, Topic::new(event))
        {
            Ok(sub_id) => json_rpc_result(id, serde_json::json!({ "subscriptionId": sub_id })),
            Err(e @ SubscribeError::EmptyTopic) => json_rpc_error(id, INVALID_PARAMS, &e.to_string()),
            Err(e) => json_rpc_error(id, SERVER_ERROR, &e.to_string()),
        }
    }

    fn handle_unsubscribe(&self, id: Option<Value>, params: Option<&Value>) -> String {
        let sub_id = match params
            .and_then(|p| p.get("subscriptionId"))
            .and_then(|s| s.as_str())
        {
            Some(s) => SubscriptionId::new(s),
            None => {
                return json_rpc_error(id, INVALID_PARAMS, "Invalid params: missing subscriptionId");
            }
        };

        if self.subscriptions.unsubscribe(self.connection_id, &sub_id) {
            json_rpc_result(id, serde_json::json!({ "unsubscribed": sub_id }))
        } else {
            json_rpc_error(
                id,
                INVALID_PARAMS,
                &format!("Subscription not found: {}", sub_id),
            )
        }
    }
}

/// Create JSON-RPC success response
fn json_rpc_result(id: Option<Value>, result: Value) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
    .to_string()
}

/// Create JSON-RPC error response
fn json_rpc_error(id: Option<Value>, code: i32, message: &str) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code,
            "message": message
        }
    })
    .to_string()
}
