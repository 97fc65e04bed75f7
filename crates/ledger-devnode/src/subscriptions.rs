//! Topic subscriptions and event fan-out.
//!
//! Each connection registers an outbox (the sending half of its writer
//! queue). Publishing an event serializes it once and pushes the frame to
//! every connection holding at least one subscription on the topic; a
//! connection subscribed twice to the same topic still receives one frame.

use crate::connection::ConnectionId;
use dashmap::DashMap;
use ledger_types::{EventPayload, SubscriptionId, Topic};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Method name of pushed events.
pub const EVENT_METHOD: &str = "event";

/// An active subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub topic: Topic,
    pub connection_id: ConnectionId,
}

#[derive(Serialize)]
struct EventNotification<'a> {
    jsonrpc: &'static str,
    method: &'static str,
    params: EventParams<'a>,
}

#[derive(Serialize)]
struct EventParams<'a> {
    event: &'a Topic,
    data: &'a EventPayload,
}

/// Encode an event push frame.
pub fn event_frame(topic: &Topic, payload: &EventPayload) -> Result<String, serde_json::Error> {
    serde_json::to_string(&EventNotification {
        jsonrpc: "2.0",
        method: EVENT_METHOD,
        params: EventParams {
            event: topic,
            data: payload,
        },
    })
}

/// Subscribe errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscribeError {
    #[error("too many subscriptions (max {0} per connection)")]
    TooManySubscriptions(u32),
    #[error("event name cannot be empty")]
    EmptyTopic,
    #[error("connection is not registered")]
    UnknownConnection,
}

/// Subscription manager
pub struct SubscriptionManager {
    /// All active subscriptions by id
    subscriptions: DashMap<SubscriptionId, Subscription>,
    /// Subscription ids by connection
    by_connection: DashMap<ConnectionId, Vec<SubscriptionId>>,
    /// Writer queues of live connections
    outboxes: DashMap<ConnectionId, mpsc::Sender<String>>,
    /// Counter for generating subscription ids
    id_counter: AtomicU64,
    max_per_connection: u32,
}

impl SubscriptionManager {
    pub fn new(max_per_connection: u32) -> Self {
        Self {
            subscriptions: DashMap::new(),
            by_connection: DashMap::new(),
            outboxes: DashMap::new(),
            id_counter: AtomicU64::new(1),
            max_per_connection,
        }
    }

    /// Register the writer queue of a new connection.
    pub fn register_connection(&self, connection_id: ConnectionId, outbox: mpsc::Sender<String>) {
        self.outboxes.insert(connection_id, outbox);
        debug!(connection_id = %connection_id, "Registered connection");
    }

    /// Subscribe `connection_id` to `topic`.
    pub fn subscribe(
        &self,
        connection_id: ConnectionId,
        topic: Topic,
    ) -> Result<SubscriptionId, SubscribeError> {
        if topic.as_str().is_empty() {
            return Err(SubscribeError::EmptyTopic);
        }
        if !self.outboxes.contains_key(&connection_id) {
            return Err(SubscribeError::UnknownConnection);
        }

        let mut conn_subs = self.by_connection.entry(connection_id).or_default();
        if conn_subs.len() as u32 >= self.max_per_connection {
            return Err(SubscribeError::TooManySubscriptions(self.max_per_connection));
        }

        let id_num = self.id_counter.fetch_add(1, Ordering::SeqCst);
        let sub_id = SubscriptionId::new(format!("0x{:x}", id_num));

        debug!(
            subscription_id = %sub_id,
            connection_id = %connection_id,
            topic = %topic,
            "Created subscription"
        );

        self.subscriptions.insert(
            sub_id.clone(),
            Subscription {
                id: sub_id.clone(),
                topic,
                connection_id,
            },
        );
        conn_subs.push(sub_id.clone());

        Ok(sub_id)
    }

    /// Remove a subscription owned by `connection_id`.
    ///
    /// Returns `false` when the id is unknown or belongs to another
    /// connection.
    pub fn unsubscribe(&self, connection_id: ConnectionId, subscription_id: &SubscriptionId) -> bool {
        let removed = self
            .subscriptions
            .remove_if(subscription_id, |_, sub| sub.connection_id == connection_id);
        if removed.is_none() {
            return false;
        }

        if let Some(mut conn_subs) = self.by_connection.get_mut(&connection_id) {
            conn_subs.retain(|id| id != subscription_id);
        }
        debug!(subscription_id = %subscription_id, "Removed subscription");
        true
    }

    /// Remove a connection and all of its subscriptions.
    pub fn remove_connection(&self, connection_id: &ConnectionId) {
        self.outboxes.remove(connection_id);
        if let Some((_, sub_ids)) = self.by_connection.remove(connection_id) {
            for sub_id in &sub_ids {
                self.subscriptions.remove(sub_id);
            }
            debug!(
                connection_id = %connection_id,
                count = sub_ids.len(),
                "Removed all subscriptions for connection"
            );
        }
    }

    /// Push an event to every connection subscribed to `topic`.
    ///
    /// Returns how many connections the frame was queued for. A connection
    /// whose queue is full misses the event.
    pub fn publish(&self, topic: &Topic, payload: &EventPayload) -> usize {
        let targets: BTreeSet<ConnectionId> = self
            .subscriptions
            .iter()
            .filter(|entry| &entry.topic == topic)
            .map(|entry| entry.connection_id)
            .collect();
        if targets.is_empty() {
            return 0;
        }

        let frame = match event_frame(topic, payload) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(topic = %topic, error = %e, "Failed to encode event");
                return 0;
            }
        };

        let mut delivered = 0;
        for connection_id in targets {
            let Some(outbox) = self.outboxes.get(&connection_id).map(|o| o.clone()) else {
                continue;
            };
            match outbox.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    connection_id = %connection_id,
                    topic = %topic,
                    error = %e,
                    "Dropped event for connection"
                ),
            }
        }
        delivered
    }

    /// Get subscription by id
    pub fn get(&self, subscription_id: &SubscriptionId) -> Option<Subscription> {
        self.subscriptions.get(subscription_id).map(|r| r.clone())
    }

    /// Get all subscriptions for a connection
    pub fn connection_subscriptions(&self, connection_id: &ConnectionId) -> Vec<Subscription> {
        self.by_connection
            .get(connection_id)
            .map(|sub_ids| {
                sub_ids
                    .iter()
                    .filter_map(|id| self.subscriptions.get(id).map(|r| r.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn total_subscriptions(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn connection_count(&self) -> usize {
        self.outboxes.len()
    }
}
