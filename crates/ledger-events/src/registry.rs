//! Subscription registry.
//!
//! Sends subscribe/unsubscribe requests and correlates the node's responses
//! with them. Correlation is a bounded scan of the inbound stream: each
//! request owns a transient [`PendingRequest`], and every frame seen while
//! scanning is either the response to that request or discarded.
//!
//! The registry also keeps a bookkeeping index of live subscriptions so a
//! client can tear down whatever its caller left behind.

use crate::codec::{Envelope, FrameCodec, Request, RequestId, ResponseId};
use crate::error::{ClientError, ClientResult};
use crate::transport::{session_ended, Connection, ReadEnds};
use ledger_types::{SubscriptionId, Topic};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// An active subscription, owned by the caller.
///
/// Consumed by [`SubscriptionRegistry::unsubscribe`]; the id is meaningless
/// once the subscription ends.
#[derive(Debug, PartialEq, Eq)]
pub struct Subscription {
    topic: Topic,
    id: SubscriptionId,
}

impl Subscription {
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }
}

/// Registry counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Subscriptions established
    pub subscribed: u64,
    /// Subscriptions ended by the caller
    pub unsubscribed: u64,
    /// Well-formed frames dropped while correlating a response
    pub discarded: u64,
    /// Undecodable frames dropped while correlating a response
    pub malformed: u64,
    /// Correlations that ran out of time
    pub timeouts: u64,
}

/// What a correlation scan is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    SubscribeAck,
    UnsubscribeAck,
}

/// A request awaiting its response. Lives for one scan only.
#[derive(Debug)]
struct PendingRequest {
    id: RequestId,
    method: &'static str,
    topic: Topic,
    expect: Expect,
    created_at: Instant,
}

/// The response a scan settled on.
enum Correlated {
    Ack(SubscriptionId),
    Rejected { code: i64, message: String },
}

impl PendingRequest {
    /// Claim `envelope` if it answers this request, otherwise hand it back.
    ///
    /// Only responses without an id, or with this request's id, are claimed.
    fn claim(&self, envelope: Envelope) -> Result<Correlated, Envelope> {
        let ours = |request_id: ResponseId| request_id.answers(self.id);
        match (self.expect, envelope) {
            (
                Expect::SubscribeAck,
                Envelope::SubscribeAck {
                    request_id,
                    subscription_id,
                },
            )
            | (
                Expect::UnsubscribeAck,
                Envelope::UnsubscribeAck {
                    request_id,
                    subscription_id,
                },
            ) if ours(request_id) => Ok(Correlated::Ack(subscription_id)),
            (
                _,
                Envelope::Rejected {
                    request_id,
                    code,
                    message,
                },
            ) if ours(request_id) => Ok(Correlated::Rejected { code, message }),
            (_, other) => Err(other),
        }
    }
}

/// Tracks the subscription lifecycle on one connection.
#[derive(Debug)]
pub struct SubscriptionRegistry {
    window: Duration,
    next_request_id: RequestId,
    live: BTreeMap<SubscriptionId, Topic>,
    stats: RegistryStats,
}

impl SubscriptionRegistry {
    /// Create a registry that waits at most `window` for each response.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            next_request_id: 1,
            live: BTreeMap::new(),
            stats: RegistryStats::default(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn stats(&self) -> RegistryStats {
        self.stats
    }

    /// Live subscriptions, by id.
    pub fn live(&self) -> impl Iterator<Item = (&SubscriptionId, &Topic)> {
        self.live.iter()
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, id: &SubscriptionId) -> bool {
        self.live.contains_key(id)
    }

    /// Subscribe to `topic` and wait for the node to assign an id.
    pub async fn subscribe(
        &mut self,
        conn: &mut Connection,
        codec: &dyn FrameCodec,
        topic: &Topic,
    ) -> ClientResult<Subscription> {
        let pending = self.pending("subscribe", topic.clone(), Expect::SubscribeAck);
        let request = Request::subscribe(pending.id, topic.clone());
        conn.send(codec.encode_request(&request)?).await?;
        debug!(request_id = pending.id, topic = %topic, "Sent subscribe");

        match self.correlate(conn, codec, &pending).await? {
            Correlated::Ack(id) => {
                self.live.insert(id.clone(), topic.clone());
                self.stats.subscribed += 1;
                info!(
                    topic = %topic,
                    subscription_id = %id,
                    elapsed_ms = pending.created_at.elapsed().as_millis() as u64,
                    "Subscribed"
                );
                Ok(Subscription {
                    topic: topic.clone(),
                    id,
                })
            }
            Correlated::Rejected { code, message } => {
                warn!(topic = %topic, code, message = %message, "Subscribe rejected");
                Err(ClientError::Rejected {
                    method: pending.method,
                    code,
                    message,
                })
            }
        }
    }

    /// End a subscription without waiting for the node to confirm.
    pub async fn unsubscribe(
        &mut self,
        conn: &mut Connection,
        codec: &dyn FrameCodec,
        subscription: Subscription,
    ) -> ClientResult<()> {
        let request_id = self.take_request_id();
        let request = Request::unsubscribe(request_id, subscription.id.clone());
        conn.send(codec.encode_request(&request)?).await?;
        self.forget(&subscription);
        debug!(
            request_id,
            topic = %subscription.topic,
            subscription_id = %subscription.id,
            "Sent unsubscribe"
        );
        Ok(())
    }

    /// End a subscription and wait for the node to acknowledge it.
    ///
    /// On failure the subscription stays in the live index so a later
    /// teardown can retry it.
    pub async fn unsubscribe_confirmed(
        &mut self,
        conn: &mut Connection,
        codec: &dyn FrameCodec,
        subscription: Subscription,
    ) -> ClientResult<()> {
        let pending = self.pending(
            "unsubscribe",
            subscription.topic.clone(),
            Expect::UnsubscribeAck,
        );
        let request = Request::unsubscribe(pending.id, subscription.id.clone());
        conn.send(codec.encode_request(&request)?).await?;

        match self.correlate(conn, codec, &pending).await? {
            Correlated::Ack(id) => {
                if id != subscription.id {
                    warn!(
                        expected = %subscription.id,
                        got = %id,
                        "Unsubscribe acknowledged a different id"
                    );
                }
                self.forget(&subscription);
                info!(
                    topic = %subscription.topic,
                    subscription_id = %subscription.id,
                    "Unsubscribed"
                );
                Ok(())
            }
            Correlated::Rejected { code, message } => Err(ClientError::Rejected {
                method: pending.method,
                code,
                message,
            }),
        }
    }

    /// Remove and return every live subscription.
    pub(crate) fn drain_live(&mut self) -> Vec<Subscription> {
        std::mem::take(&mut self.live)
            .into_iter()
            .map(|(id, topic)| Subscription { topic, id })
            .collect()
    }

    fn forget(&mut self, subscription: &Subscription) {
        if self.live.remove(&subscription.id).is_some() {
            self.stats.unsubscribed += 1;
        }
    }

    fn take_request_id(&mut self) -> RequestId {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    fn pending(&mut self, method: &'static str, topic: Topic, expect: Expect) -> PendingRequest {
        PendingRequest {
            id: self.take_request_id(),
            method,
            topic,
            expect,
            created_at: Instant::now(),
        }
    }

    /// Scan inbound frames until `pending` is answered or the window closes.
    async fn correlate(
        &mut self,
        conn: &mut Connection,
        codec: &dyn FrameCodec,
        pending: &PendingRequest,
    ) -> ClientResult<Correlated> {
        let window = self.window;
        let deadline = tokio::time::sleep(window);
        tokio::pin!(deadline);

        let ReadEnds {
            results,
            errors,
            done,
        } = conn.read_ends();

        loop {
            tokio::select! {
                biased;
                frame = results.recv() => {
                    let Some(frame) = frame else {
                        return Err(ClientError::Closed);
                    };
                    match codec.decode(&frame) {
                        Ok(envelope) => match pending.claim(envelope) {
                            Ok(correlated) => return Ok(correlated),
                            Err(other) => {
                                self.stats.discarded += 1;
                                debug!(
                                    request_id = pending.id,
                                    kind = other.kind(),
                                    "Discarding frame while correlating"
                                );
                            }
                        },
                        Err(e) => {
                            self.stats.malformed += 1;
                            warn!(
                                request_id = pending.id,
                                error = %e,
                                "Discarding malformed frame while correlating"
                            );
                        }
                    }
                }
                error = errors.recv() => {
                    return Err(match error {
                        Some(e) => ClientError::Transport(e),
                        None => ClientError::Closed,
                    });
                }
                _ = session_ended(done) => return Err(ClientError::Closed),
                _ = &mut deadline => {
                    self.stats.timeouts += 1;
                    warn!(
                        request_id = pending.id,
                        method = pending.method,
                        topic = %pending.topic,
                        timeout_ms = window.as_millis() as u64,
                        "No response within window"
                    );
                    return Err(ClientError::Timeout {
                        operation: pending.method,
                        topic: pending.topic.clone(),
                        window,
                    });
                }
            }
        }
    }
}
