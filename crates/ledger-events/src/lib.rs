//! # Ledger Events
//!
//! Client for a ledger node's WebSocket event stream: subscribe to named
//! topics and wait, with a bounded window, for the one event that matches a
//! caller-supplied predicate.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                       EventClient                         │
//! ├───────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────────┐  ┌───────────────────────┐  │
//! │  │   SubscriptionRegistry   │  │      EventWaiter      │  │
//! │  │  subscribe / unsubscribe │  │  trigger, then reader │  │
//! │  │  response correlation    │  │  raced against timer  │  │
//! │  └────────────┬─────────────┘  └───────────┬───────────┘  │
//! │               └──────────┬─────────────────┘              │
//! │                 FrameCodec (JSON-RPC 2.0)                 │
//! │                          │                                │
//! │  ┌───────────────────────┴───────────────────────────┐    │
//! │  │  Connection: results / errors / done + outbound   │    │
//! │  └───────────────────────┬───────────────────────────┘    │
//! └──────────────────────────┼────────────────────────────────┘
//!                            │ WebSocket
//!                       ledger node
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use ledger_events::{predicates, ClientConfig, EventClient};
//! use ledger_types::Topic;
//!
//! let mut client = EventClient::connect(ClientConfig::from_env()).await?;
//! let topic = Topic::account_input(&sender);
//! let (receipt, outcome) = client
//!     .subscribe_and_wait_for_next(
//!         &topic,
//!         node.broadcast(tx),
//!         predicates::validate_send(sender, 100, receiver),
//!     )
//!     .await?;
//! assert!(outcome.is_matched());
//! client.stop().await;
//! ```

pub mod blocks;
pub mod broadcast;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod predicates;
pub mod registry;
pub mod transport;
pub mod waiter;

pub use broadcast::Broadcaster;
pub use client::EventClient;
pub use codec::{Envelope, FrameCodec, JsonRpcCodec, Request, RequestId, ResponseId};
pub use config::{ClientConfig, ConfigError};
pub use error::{
    BroadcastError, ClientError, ClientResult, DecodeError, PredicateMismatch, TransportError,
    WaitError,
};
pub use registry::{RegistryStats, Subscription, SubscriptionRegistry};
pub use transport::{Connection, MemoryTransport, ServerEnd};
pub use waiter::{EventPredicate, EventWaiter, WaitOutcome};
