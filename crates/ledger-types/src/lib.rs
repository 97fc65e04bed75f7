//! # Ledger Types Crate
//!
//! Entities exchanged between a ledger node's event endpoint and its clients.
//!
//! ## Clusters
//!
//! - **Chain**: `Block`, `Transaction` (`SendTx`, `CallTx`), `Receipt`
//! - **Events**: `Topic`, `EventPayload` and its per-kind data
//! - **Primitives**: `Address`, `Hash`, `Bytes` (hex on the wire)

pub mod entities;
pub mod events;

pub use entities::*;
pub use events::*;
