//! Error types for the event client.
//!
//! Two families:
//! - [`ClientError`]: everything an operation on the client can return.
//! - [`WaitError`]: the fatal cause carried by `WaitOutcome::Errored`, always
//!   tagged with the topic being waited on.

use crate::config::ConfigError;
use ledger_types::{Address, Bytes, Hash, Topic};
use std::time::Duration;
use thiserror::Error;

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors returned by client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The transport could not be established.
    #[error("failed to connect to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// No correlated response arrived within the window.
    #[error("{operation} for {topic} timed out after {}ms", .window.as_millis())]
    Timeout {
        operation: &'static str,
        topic: Topic,
        window: Duration,
    },

    /// The node answered a request with an error.
    #[error("{method} rejected by node (code {code}): {message}")]
    Rejected {
        method: &'static str,
        code: i64,
        message: String,
    },

    #[error(transparent)]
    Malformed(#[from] DecodeError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Wait(#[from] WaitError),

    #[error(transparent)]
    Broadcast(#[from] BroadcastError),

    /// The session ended while an operation was in flight.
    #[error("connection closed")]
    Closed,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Faults raised by the transport. Every one of them ends the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    Socket(String),

    #[error("frame of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("connection is closed")]
    Closed,
}

/// Frames that cannot be turned into an envelope.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON-RPC frame: {0}")]
    Json(#[source] serde_json::Error),

    #[error("invalid payload for {topic}: {source}")]
    Payload {
        topic: Topic,
        #[source]
        source: serde_json::Error,
    },

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Fatal cause of an errored wait.
#[derive(Debug, Error)]
pub enum WaitError {
    #[error("malformed frame while waiting on {topic}: {source}")]
    Malformed {
        topic: Topic,
        #[source]
        source: DecodeError,
    },

    #[error("event on {topic} failed validation: {source}")]
    Mismatch {
        topic: Topic,
        #[source]
        source: PredicateMismatch,
    },

    #[error("transport failed while waiting on {topic}: {source}")]
    Transport {
        topic: Topic,
        #[source]
        source: TransportError,
    },
}

impl WaitError {
    /// Topic the failed wait was keyed on.
    pub fn topic(&self) -> &Topic {
        match self {
            WaitError::Malformed { topic, .. }
            | WaitError::Mismatch { topic, .. }
            | WaitError::Transport { topic, .. } => topic,
        }
    }

    /// The predicate failure, if that is what ended the wait.
    pub fn mismatch(&self) -> Option<&PredicateMismatch> {
        match self {
            WaitError::Mismatch { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// A matching-topic event that violates the caller's expectations.
///
/// Addresses and hashes print in full `0x` hex so expected and actual values
/// can be compared by eye.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PredicateMismatch {
    #[error("execution raised an exception: {0}")]
    Exception(String),

    #[error("unexpected payload: expected {expected}, got {got}")]
    UnexpectedPayload {
        expected: &'static str,
        got: &'static str,
    },

    #[error("unexpected transaction: expected {expected}, got {got}")]
    UnexpectedTransaction {
        expected: &'static str,
        got: &'static str,
    },

    #[error("transaction has no {0}")]
    EmptyTransaction(&'static str),

    #[error("senders do not match: expected {expected:#x}, got {got:#x}")]
    Sender { expected: Address, got: Address },

    #[error("amounts do not match: expected {expected}, got {got}")]
    Amount { expected: u64, got: u64 },

    #[error("receivers do not match: expected {expected:#x}, got {got:#x}")]
    Receiver { expected: Address, got: Address },

    #[error("return data does not match: expected {expected}, got {got}")]
    Return { expected: Bytes, got: Bytes },

    #[error("origins do not match: expected {expected:#x}, got {got:#x}")]
    Origin { expected: Address, got: Address },

    #[error("tx ids do not match: expected {expected:#x}, got {got:#x}")]
    TxId { expected: Hash, got: Hash },

    #[error("{0}")]
    Custom(String),
}

/// Errors from submitting a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BroadcastError {
    /// The node refused the transaction (bad sequence, insufficient funds, ...).
    #[error("transaction rejected: {0}")]
    Rejected(String),

    /// The node could not be reached.
    #[error("broadcaster unavailable: {0}")]
    Unavailable(String),
}
