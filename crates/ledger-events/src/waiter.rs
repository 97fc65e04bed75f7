//! Event waiter.
//!
//! A wait runs the caller's trigger to completion, then races a reader over
//! the connection's inbound frames against a timer:
//!
//! ```text
//! Idle -> Running(trigger) -> Racing -> Matched | TimedOut | Errored
//! ```
//!
//! The reader decodes every frame, skips anything that is not an event on
//! the requested topic and hands the rest to the predicate. Exactly one
//! outcome is produced per wait. When the timer wins, the reader future is
//! dropped, so it can never consume a frame after the wait has returned.
//!
//! If the session ends before a match, the reader stops consuming and the
//! wait resolves `TimedOut` once the window expires.

use crate::codec::{Envelope, FrameCodec};
use crate::error::{ClientError, PredicateMismatch, WaitError};
use crate::transport::{session_ended, Connection, ReadEnds};
use ledger_types::{EventPayload, Topic};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info_span, trace, warn, Instrument};

/// Decides whether an event on the awaited topic is the one being waited for.
///
/// - `Ok(true)`: match, the wait completes with this payload
/// - `Ok(false)`: not this one, keep listening
/// - `Err(_)`: the event is wrong, the wait fails immediately
///
/// Any `FnMut(&Topic, &EventPayload) -> Result<bool, PredicateMismatch>`
/// closure is a predicate.
pub trait EventPredicate {
    fn check(&mut self, topic: &Topic, payload: &EventPayload) -> Result<bool, PredicateMismatch>;
}

impl<F> EventPredicate for F
where
    F: FnMut(&Topic, &EventPayload) -> Result<bool, PredicateMismatch>,
{
    fn check(&mut self, topic: &Topic, payload: &EventPayload) -> Result<bool, PredicateMismatch> {
        self(topic, payload)
    }
}

/// Result of one wait.
#[derive(Debug)]
pub enum WaitOutcome {
    /// The predicate accepted this payload.
    Matched(EventPayload),
    /// No accepted event within the window.
    TimedOut,
    /// The wait failed before a match.
    Errored(WaitError),
}

impl WaitOutcome {
    pub fn is_matched(&self) -> bool {
        matches!(self, WaitOutcome::Matched(_))
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, WaitOutcome::TimedOut)
    }

    pub fn is_errored(&self) -> bool {
        matches!(self, WaitOutcome::Errored(_))
    }

    /// The matched payload, if any.
    pub fn payload(&self) -> Option<&EventPayload> {
        match self {
            WaitOutcome::Matched(payload) => Some(payload),
            _ => None,
        }
    }

    /// The failure cause, if any.
    pub fn error(&self) -> Option<&WaitError> {
        match self {
            WaitOutcome::Errored(e) => Some(e),
            _ => None,
        }
    }

    /// Convert into a `Result`, treating a timeout as an error.
    pub fn into_result(self, topic: &Topic, window: Duration) -> Result<EventPayload, ClientError> {
        match self {
            WaitOutcome::Matched(payload) => Ok(payload),
            WaitOutcome::TimedOut => Err(ClientError::Timeout {
                operation: "wait",
                topic: topic.clone(),
                window,
            }),
            WaitOutcome::Errored(e) => Err(ClientError::Wait(e)),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            WaitOutcome::Matched(_) => "matched",
            WaitOutcome::TimedOut => "timed_out",
            WaitOutcome::Errored(_) => "errored",
        }
    }
}

/// Runs waits on a connection with a fixed window.
#[derive(Debug, Clone, Copy)]
pub struct EventWaiter {
    window: Duration,
}

impl EventWaiter {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Run `trigger`, then wait for an event on `topic` that `predicate`
    /// accepts. The trigger's output is returned alongside the outcome.
    ///
    /// The timer starts after the trigger completes; events delivered while
    /// the trigger runs stay queued for the reader.
    pub async fn run_then_wait<T, F, P>(
        &self,
        conn: &mut Connection,
        codec: &dyn FrameCodec,
        topic: &Topic,
        trigger: F,
        predicate: P,
    ) -> (T, WaitOutcome)
    where
        F: Future<Output = T>,
        P: EventPredicate,
    {
        let value = trigger.await;
        let outcome = self.wait(conn, codec, topic, predicate).await;
        (value, outcome)
    }

    /// [`run_then_wait`](Self::run_then_wait) for triggers without output.
    pub async fn wait_for_event<F, P>(
        &self,
        conn: &mut Connection,
        codec: &dyn FrameCodec,
        topic: &Topic,
        trigger: F,
        predicate: P,
    ) -> WaitOutcome
    where
        F: Future<Output = ()>,
        P: EventPredicate,
    {
        self.run_then_wait(conn, codec, topic, trigger, predicate)
            .await
            .1
    }

    /// Wait without a trigger.
    pub async fn wait<P>(
        &self,
        conn: &mut Connection,
        codec: &dyn FrameCodec,
        topic: &Topic,
        predicate: P,
    ) -> WaitOutcome
    where
        P: EventPredicate,
    {
        let window = self.window;
        let span = info_span!(
            "wait_for_event",
            topic = %topic,
            window_ms = window.as_millis() as u64
        );

        async move {
            let started = Instant::now();
            let reader = read_until_match(conn.read_ends(), codec, topic, predicate);

            let outcome = tokio::select! {
                outcome = reader => outcome,
                _ = tokio::time::sleep(window) => WaitOutcome::TimedOut,
            };

            let elapsed_ms = started.elapsed().as_millis() as u64;
            match &outcome {
                WaitOutcome::Errored(e) => {
                    warn!(outcome = outcome.label(), elapsed_ms, error = %e, "Wait failed")
                }
                _ => debug!(outcome = outcome.label(), elapsed_ms, "Wait finished"),
            }
            outcome
        }
        .instrument(span)
        .await
    }
}

async fn read_until_match<P>(
    ends: ReadEnds<'_>,
    codec: &dyn FrameCodec,
    topic: &Topic,
    mut predicate: P,
) -> WaitOutcome
where
    P: EventPredicate,
{
    let ReadEnds {
        results,
        errors,
        done,
    } = ends;

    loop {
        tokio::select! {
            biased;
            frame = results.recv() => {
                let Some(frame) = frame else { break };
                let envelope = match codec.decode(&frame) {
                    Ok(envelope) => envelope,
                    Err(source) => {
                        return WaitOutcome::Errored(WaitError::Malformed {
                            topic: topic.clone(),
                            source,
                        })
                    }
                };
                let (event_topic, payload) = match envelope {
                    Envelope::Event { topic, payload } => (topic, payload),
                    other => {
                        trace!(kind = other.kind(), "Skipping non-event frame");
                        continue;
                    }
                };
                if &event_topic != topic {
                    trace!(event_topic = %event_topic, "Skipping event on another topic");
                    continue;
                }
                match predicate.check(&event_topic, &payload) {
                    Ok(true) => return WaitOutcome::Matched(payload),
                    Ok(false) => trace!(kind = payload.kind(), "Predicate declined event"),
                    Err(source) => {
                        return WaitOutcome::Errored(WaitError::Mismatch {
                            topic: topic.clone(),
                            source,
                        })
                    }
                }
            }
            error = errors.recv() => match error {
                Some(source) => {
                    return WaitOutcome::Errored(WaitError::Transport {
                        topic: topic.clone(),
                        source,
                    })
                }
                None => break,
            },
            _ = session_ended(done) => break,
        }
    }

    debug!(topic = %topic, "Session ended before a match");
    std::future::pending().await
}
