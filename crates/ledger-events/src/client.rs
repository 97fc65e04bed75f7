//! Event client facade.
//!
//! [`EventClient`] owns one connection, its subscription registry and the
//! wire codec. Every operation that reads from the connection takes
//! `&mut self`, so a client has exactly one consumer at a time; concurrent
//! waits need separate clients.

use crate::codec::{FrameCodec, JsonRpcCodec};
use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::registry::{Subscription, SubscriptionRegistry};
use crate::transport::Connection;
use crate::waiter::{EventPredicate, EventWaiter, WaitOutcome};
use ledger_types::Topic;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Client for a node's event endpoint.
pub struct EventClient {
    config: ClientConfig,
    conn: Connection,
    registry: SubscriptionRegistry,
    waiter: EventWaiter,
    codec: Box<dyn FrameCodec>,
}

impl EventClient {
    /// Connect to `config.endpoint`.
    pub async fn connect(config: ClientConfig) -> ClientResult<Self> {
        let conn = Connection::start(&config).await?;
        Ok(Self::with_connection(config, conn))
    }

    /// Build a client over an existing connection.
    pub fn with_connection(config: ClientConfig, conn: Connection) -> Self {
        Self {
            registry: SubscriptionRegistry::new(config.timeout),
            waiter: EventWaiter::new(config.timeout),
            codec: Box::new(JsonRpcCodec),
            conn,
            config,
        }
    }

    /// Replace the wire codec.
    pub fn with_codec(mut self, codec: impl FrameCodec + 'static) -> Self {
        self.codec = Box::new(codec);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// The window used for correlation and waits.
    pub fn window(&self) -> Duration {
        self.config.timeout
    }

    /// Whether the session is still open.
    pub fn is_connected(&self) -> bool {
        !self.conn.is_done()
    }

    /// Subscribe to `topic`.
    pub async fn subscribe(&mut self, topic: &Topic) -> ClientResult<Subscription> {
        self.registry
            .subscribe(&mut self.conn, self.codec.as_ref(), topic)
            .await
    }

    /// End a subscription without waiting for confirmation.
    pub async fn unsubscribe(&mut self, subscription: Subscription) -> ClientResult<()> {
        self.registry
            .unsubscribe(&mut self.conn, self.codec.as_ref(), subscription)
            .await
    }

    /// End a subscription and wait for the node to confirm it.
    pub async fn unsubscribe_confirmed(&mut self, subscription: Subscription) -> ClientResult<()> {
        self.registry
            .unsubscribe_confirmed(&mut self.conn, self.codec.as_ref(), subscription)
            .await
    }

    /// Wait for an accepted event on `topic`, without a trigger.
    pub async fn wait<P>(&mut self, topic: &Topic, predicate: P) -> WaitOutcome
    where
        P: EventPredicate,
    {
        self.waiter
            .wait(&mut self.conn, self.codec.as_ref(), topic, predicate)
            .await
    }

    /// Run `trigger`, then wait for an accepted event on `topic`.
    pub async fn wait_for_event<F, P>(&mut self, topic: &Topic, trigger: F, predicate: P) -> WaitOutcome
    where
        F: Future<Output = ()>,
        P: EventPredicate,
    {
        self.waiter
            .wait_for_event(&mut self.conn, self.codec.as_ref(), topic, trigger, predicate)
            .await
    }

    /// Run `trigger`, then wait; the trigger's output comes back with the
    /// outcome.
    pub async fn run_then_wait<T, F, P>(
        &mut self,
        topic: &Topic,
        trigger: F,
        predicate: P,
    ) -> (T, WaitOutcome)
    where
        F: Future<Output = T>,
        P: EventPredicate,
    {
        self.waiter
            .run_then_wait(&mut self.conn, self.codec.as_ref(), topic, trigger, predicate)
            .await
    }

    /// Subscribe to `topic`, run `trigger`, wait for an accepted event, then
    /// unsubscribe whatever the outcome.
    pub async fn subscribe_and_wait_for_next<T, F, P>(
        &mut self,
        topic: &Topic,
        trigger: F,
        predicate: P,
    ) -> ClientResult<(T, WaitOutcome)>
    where
        F: Future<Output = T>,
        P: EventPredicate,
    {
        let subscription = self.subscribe(topic).await?;
        let (value, outcome) = self.run_then_wait(topic, trigger, predicate).await;
        if let Err(e) = self.unsubscribe(subscription).await {
            warn!(topic = %topic, error = %e, "Unsubscribe after wait failed");
        }
        Ok((value, outcome))
    }

    /// Unsubscribe everything still live, then close the connection.
    /// Failures are logged; stopping always completes.
    pub async fn stop(&mut self) {
        let leftovers = self.registry.drain_live();
        if !leftovers.is_empty() && !self.conn.is_done() {
            debug!(count = leftovers.len(), "Unsubscribing leftover subscriptions");
            for subscription in leftovers {
                let topic = subscription.topic().clone();
                if let Err(e) = self
                    .registry
                    .unsubscribe(&mut self.conn, self.codec.as_ref(), subscription)
                    .await
                {
                    warn!(topic = %topic, error = %e, "Failed to unsubscribe on stop");
                }
            }
        }
        self.conn.stop().await;
        info!(endpoint = %self.config.endpoint, "Event client stopped");
    }
}
