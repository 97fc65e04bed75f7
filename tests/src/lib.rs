//! # Ledger Events Test Suite
//!
//! End-to-end scenarios for the event client, run over a real WebSocket
//! against the in-process development node.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs        # TestNet builder: node, named accounts, clients
//! │
//! └── integration/
//!     ├── blocks.rs      # NewBlock waits, height progression
//!     ├── transfers.rs   # Send events, validation, double fire
//!     ├── contracts.rs   # Contract creation and invocation events
//!     ├── lifecycle.rs   # Subscribe / unsubscribe, rejection, shutdown
//!     └── faults.rs      # Malformed frames, transport faults
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p ledger-tests
//!
//! # By category
//! cargo test -p ledger-tests integration::contracts::
//! ```

#![allow(dead_code)]

pub mod fixtures;
pub mod integration;
