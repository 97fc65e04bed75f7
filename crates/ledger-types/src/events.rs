//! # Event Topics and Payloads
//!
//! A node publishes every event under a string topic. Account topics embed
//! the upper-case hex address: `Acc/<ADDR>/Input`, `Acc/<ADDR>/Output`,
//! `Acc/<ADDR>/Call`. Block commits are published under `NewBlock`.

use crate::entities::{Address, Block, Bytes, Hash, Transaction};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Topic of block commit events.
pub const NEW_BLOCK_TOPIC: &str = "NewBlock";

/// String identifier a subscription or a wait is keyed on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    pub fn new(topic: impl Into<String>) -> Self {
        Self(topic.into())
    }

    /// Block commits.
    pub fn new_block() -> Self {
        Self(NEW_BLOCK_TOPIC.to_string())
    }

    /// Transactions spending from `address`.
    pub fn account_input(address: &Address) -> Self {
        Self(format!("Acc/{}/Input", hex::encode_upper(address.as_bytes())))
    }

    /// Transactions paying to (or invoking) `address`.
    pub fn account_output(address: &Address) -> Self {
        Self(format!("Acc/{}/Output", hex::encode_upper(address.as_bytes())))
    }

    /// Contract executions at `address`, including nested calls.
    pub fn account_call(address: &Address) -> Self {
        Self(format!("Acc/{}/Call", hex::encode_upper(address.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Topic {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Topic {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Server-assigned identifier of an active subscription.
///
/// Opaque to the client; only meaningful while the subscription is live.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriptionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Data of `NewBlock` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBlockData {
    pub block: Block,
}

/// Data of account input/output events: the transaction and its execution
/// result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxData {
    pub tx: Transaction,
    #[serde(default)]
    pub return_data: Bytes,
    /// Empty when execution succeeded.
    #[serde(default)]
    pub exception: String,
}

/// One contract execution frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallInfo {
    pub caller: Address,
    pub callee: Address,
    pub data: Bytes,
    pub value: u64,
    pub gas: u64,
}

/// Data of `Acc/<ADDR>/Call` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallData {
    pub call: CallInfo,
    /// Account that signed the outermost transaction.
    pub origin: Address,
    /// Id of the outermost transaction.
    pub tx_id: Hash,
    #[serde(default)]
    pub return_data: Bytes,
    #[serde(default)]
    pub exception: String,
}

/// Payload of a pushed event, discriminated by `type`.
///
/// Unknown `type` values fail to deserialize; consumers surface that as a
/// malformed frame rather than skipping it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EventPayload {
    NewBlock(NewBlockData),
    AccountInput(TxData),
    AccountOutput(TxData),
    ContractCall(CallData),
}

impl EventPayload {
    /// Wire name of the payload kind.
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::NewBlock(_) => "newBlock",
            EventPayload::AccountInput(_) => "accountInput",
            EventPayload::AccountOutput(_) => "accountOutput",
            EventPayload::ContractCall(_) => "contractCall",
        }
    }

    /// The block of a `NewBlock` payload.
    pub fn as_block(&self) -> Option<&Block> {
        match self {
            EventPayload::NewBlock(data) => Some(&data.block),
            _ => None,
        }
    }

    /// The transaction data of an account input/output payload.
    pub fn as_tx_data(&self) -> Option<&TxData> {
        match self {
            EventPayload::AccountInput(data) | EventPayload::AccountOutput(data) => Some(data),
            _ => None,
        }
    }

    /// The call data of a `ContractCall` payload.
    pub fn as_call_data(&self) -> Option<&CallData> {
        match self {
            EventPayload::ContractCall(data) => Some(data),
            _ => None,
        }
    }
}
