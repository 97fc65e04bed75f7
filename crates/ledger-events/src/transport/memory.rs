//! In-memory transport.
//!
//! Builds a [`Connection`] over plain channels and hands the other side to
//! the caller as a [`ServerEnd`], which can push frames, read the client's
//! requests, inject transport faults and end the session.

use super::Connection;
use crate::error::TransportError;
use bytes::Bytes;
use ledger_types::{EventPayload, SubscriptionId, Topic};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Factory for in-memory connection pairs.
pub struct MemoryTransport;

impl MemoryTransport {
    /// A connected pair with the given inbound queue capacity.
    pub fn pair(capacity: usize) -> (Connection, ServerEnd) {
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let (results_tx, results_rx) = mpsc::channel(capacity);
        let (errors_tx, errors_rx) = mpsc::channel(1);
        let (done_tx, _) = watch::channel(false);
        let done_tx = Arc::new(done_tx);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let connection = Connection::from_parts(
            "memory://".to_string(),
            outbound_tx,
            results_rx,
            errors_rx,
            done_tx.clone(),
            shutdown_tx,
        );
        let server = ServerEnd {
            results: results_tx,
            errors: errors_tx,
            requests: outbound_rx,
            done: done_tx,
            shutdown: shutdown_rx,
        };
        (connection, server)
    }
}

/// The node's side of an in-memory connection.
pub struct ServerEnd {
    results: mpsc::Sender<Bytes>,
    errors: mpsc::Sender<TransportError>,
    requests: mpsc::Receiver<String>,
    done: Arc<watch::Sender<bool>>,
    shutdown: watch::Receiver<bool>,
}

impl ServerEnd {
    /// Deliver a raw frame to the client.
    pub async fn push(&self, frame: impl Into<String>) {
        let _ = self.results.send(Bytes::from(frame.into())).await;
    }

    /// Deliver a JSON frame to the client.
    pub async fn push_json(&self, frame: &Value) {
        self.push(frame.to_string()).await;
    }

    /// Deliver an event push.
    pub async fn push_event(&self, topic: &Topic, payload: &EventPayload) {
        self.push_json(&json!({
            "jsonrpc": "2.0",
            "method": "event",
            "params": { "event": topic, "data": payload },
        }))
        .await;
    }

    /// Next request the client sent, parsed as JSON.
    pub async fn next_request(&mut self) -> Option<Value> {
        let frame = self.requests.recv().await?;
        serde_json::from_str(&frame).ok()
    }

    /// Read the next request and acknowledge it as a subscribe.
    pub async fn accept_subscribe(&mut self, subscription_id: &str) -> Option<Value> {
        let request = self.next_request().await?;
        self.push_json(&json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "result": { "subscriptionId": SubscriptionId::new(subscription_id) },
        }))
        .await;
        Some(request)
    }

    /// Read the next request and acknowledge it as an unsubscribe.
    pub async fn accept_unsubscribe(&mut self) -> Option<Value> {
        let request = self.next_request().await?;
        self.push_json(&json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "result": { "unsubscribed": request["params"]["subscriptionId"] },
        }))
        .await;
        Some(request)
    }

    /// Read the next request and answer it with an error.
    pub async fn reject(&mut self, code: i64, message: &str) -> Option<Value> {
        let request = self.next_request().await?;
        self.push_json(&json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "error": { "code": code, "message": message },
        }))
        .await;
        Some(request)
    }

    /// Report a transport fault to the client.
    pub async fn fail(&self, error: TransportError) {
        let _ = self.errors.send(error).await;
    }

    /// End the session from the node's side.
    pub fn close(&self) {
        self.done.send_replace(true);
    }

    /// Whether the client has stopped the connection.
    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }
}
