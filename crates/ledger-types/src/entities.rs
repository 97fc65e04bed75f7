//! # Core Ledger Entities
//!
//! Blocks, transactions and receipts as the node reports them on its event
//! stream. All byte-like fields serialize as `0x`-prefixed hex strings.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;

pub use primitive_types::{H160 as Address, H256 as Hash};

/// Block height type.
pub type BlockHeight = u64;

// =============================================================================
// PRIMITIVES
// =============================================================================

/// Byte buffer with hex serialization.
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct Bytes(pub Vec<u8>);

impl Bytes {
    pub fn new() -> Self {
        Bytes(Vec::new())
    }

    pub fn from_slice(slice: &[u8]) -> Self {
        Bytes(slice.to_vec())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(v: Vec<u8>) -> Self {
        Bytes(v)
    }
}

impl From<&[u8]> for Bytes {
    fn from(v: &[u8]) -> Self {
        Bytes(v.to_vec())
    }
}

impl AsRef<[u8]> for Bytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

impl Serialize for Bytes {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(&self.0)))
    }
}

impl<'de> Deserialize<'de> for Bytes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(s)
            .map(Bytes)
            .map_err(|_| de::Error::custom("invalid hex bytes"))
    }
}

/// Derive a deterministic address from an arbitrary label.
///
/// Used for named development accounts: the last 20 bytes of
/// `keccak256(label)`.
pub fn address_from_label(label: &str) -> Address {
    let digest = Keccak256::digest(label.as_bytes());
    Address::from_slice(&digest[12..])
}

/// Address of a contract created by `creator` with the given sequence number.
pub fn contract_address(creator: &Address, sequence: u64) -> Address {
    let mut hasher = Keccak256::new();
    hasher.update(creator.as_bytes());
    hasher.update(sequence.to_be_bytes());
    let digest = hasher.finalize();
    Address::from_slice(&digest[12..])
}

// =============================================================================
// CHAIN
// =============================================================================

/// Summary of a committed block, as carried by `NewBlock` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Block height in the chain.
    pub height: BlockHeight,
    /// Hash of this block.
    pub hash: Hash,
    /// Hash of the parent block.
    pub parent_hash: Hash,
    /// Number of transactions committed in this block.
    pub num_txs: u32,
}

impl Block {
    /// Build the block at `height` on top of `parent_hash`.
    pub fn next(height: BlockHeight, parent_hash: Hash, num_txs: u32) -> Self {
        let mut hasher = Keccak256::new();
        hasher.update(height.to_be_bytes());
        hasher.update(parent_hash.as_bytes());
        hasher.update(num_txs.to_be_bytes());
        let hash = Hash::from_slice(&hasher.finalize());
        Self {
            height,
            hash,
            parent_hash,
            num_txs,
        }
    }
}

/// A spending input: `amount` leaves `address`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub address: Address,
    pub amount: u64,
    /// Account sequence this input consumes (previous sequence + 1).
    pub sequence: u64,
}

/// A receiving output: `amount` arrives at `address`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: Address,
    pub amount: u64,
}

/// Value transfer between accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendTx {
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

/// Contract creation (`address == None`) or contract invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallTx {
    pub input: TxInput,
    pub address: Option<Address>,
    pub gas_limit: u64,
    pub fee: u64,
    pub data: Bytes,
}

impl CallTx {
    /// Whether this call deploys a new contract.
    pub fn creates_contract(&self) -> bool {
        self.address.is_none()
    }
}

/// A transaction as carried inside account events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Transaction {
    Send(SendTx),
    Call(CallTx),
}

impl Transaction {
    /// Short name of the transaction kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Transaction::Send(_) => "send",
            Transaction::Call(_) => "call",
        }
    }

    /// Canonical bytes hashed to obtain the transaction id.
    ///
    /// Binding the chain id keeps ids distinct across networks.
    pub fn sign_bytes(&self, chain_id: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(128);
        out.extend_from_slice(&(chain_id.len() as u32).to_be_bytes());
        out.extend_from_slice(chain_id.as_bytes());
        match self {
            Transaction::Send(tx) => {
                out.push(0x01);
                out.extend_from_slice(&(tx.inputs.len() as u32).to_be_bytes());
                for input in &tx.inputs {
                    push_input(&mut out, input);
                }
                out.extend_from_slice(&(tx.outputs.len() as u32).to_be_bytes());
                for output in &tx.outputs {
                    out.extend_from_slice(output.address.as_bytes());
                    out.extend_from_slice(&output.amount.to_be_bytes());
                }
            }
            Transaction::Call(tx) => {
                out.push(0x02);
                push_input(&mut out, &tx.input);
                match &tx.address {
                    Some(address) => {
                        out.push(0x01);
                        out.extend_from_slice(address.as_bytes());
                    }
                    None => out.push(0x00),
                }
                out.extend_from_slice(&tx.gas_limit.to_be_bytes());
                out.extend_from_slice(&tx.fee.to_be_bytes());
                out.extend_from_slice(&(tx.data.len() as u32).to_be_bytes());
                out.extend_from_slice(tx.data.as_slice());
            }
        }
        out
    }

    /// Transaction id: `keccak256(sign_bytes(chain_id))`.
    pub fn hash(&self, chain_id: &str) -> Hash {
        Hash::from_slice(&Keccak256::digest(self.sign_bytes(chain_id)))
    }
}

fn push_input(out: &mut Vec<u8>, input: &TxInput) {
    out.extend_from_slice(input.address.as_bytes());
    out.extend_from_slice(&input.amount.to_be_bytes());
    out.extend_from_slice(&input.sequence.to_be_bytes());
}

/// What the node hands back when it accepts a broadcast transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub tx_hash: Hash,
    pub creates_contract: bool,
    /// Address of the deployed contract when `creates_contract` is set.
    pub contract_address: Option<Address>,
}
