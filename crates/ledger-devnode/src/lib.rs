//! # Ledger Development Node
//!
//! A single-process ledger that serves the event protocol over WebSocket.
//! Stands in for a real node when exercising event clients end to end.
//!
//! ## Components
//!
//! - **Ledger**: accounts, send and call execution, block commits
//! - **Event endpoint**: axum WebSocket route speaking JSON-RPC 2.0
//!   `subscribe` / `unsubscribe`, pushing `event` notifications
//! - **Block producer**: commits a block every `block_interval`, or on
//!   demand through [`DevNode::produce_block`]
//! - **Broadcaster**: [`DevNode`] accepts transactions in-process
//!
//! ## Example
//!
//! ```rust,ignore
//! use ledger_devnode::{DevNode, DevNodeConfig, GenesisAccount};
//!
//! let node = DevNode::start(
//!     DevNodeConfig::ephemeral().with_account(GenesisAccount::named("alice", 1_000_000)),
//! )
//! .await?;
//! let client = EventClient::connect(ClientConfig::new(node.endpoint())).await?;
//! ```

pub mod config;
pub mod connection;
pub mod ledger;
pub mod node;
pub mod server;
pub mod subscriptions;

pub use config::{ConfigError, DevNodeConfig, GenesisAccount};
pub use connection::ConnectionId;
pub use ledger::{forwarding_contract, return_contract, Account, Ledger, LedgerError};
pub use node::{DevNode, DevNodeError};
pub use subscriptions::{SubscribeError, SubscriptionManager};
