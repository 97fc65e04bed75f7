//! # Integration Scenarios
//!
//! Each scenario starts its own [`TestNet`](crate::fixtures::TestNet),
//! connects one or more event clients over WebSocket and drives the node
//! through broadcasts and block commits.

pub mod contracts;
pub mod faults;
pub mod lifecycle;
pub mod transfers;
