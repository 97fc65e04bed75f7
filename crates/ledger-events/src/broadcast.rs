//! Transaction submission seam.
//!
//! Waits are usually triggered by broadcasting a transaction. The client
//! does not build or sign transactions; it drives whatever implements
//! [`Broadcaster`].

use crate::error::BroadcastError;
use async_trait::async_trait;
use ledger_types::{Receipt, Transaction};
use std::sync::Arc;

/// Submits transactions to a node.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Submit `tx` and return the node's receipt.
    async fn broadcast(&self, tx: Transaction) -> Result<Receipt, BroadcastError>;

    /// Chain the broadcaster submits to; transaction ids are bound to it.
    fn chain_id(&self) -> &str;
}

#[async_trait]
impl<B: Broadcaster + ?Sized> Broadcaster for Arc<B> {
    async fn broadcast(&self, tx: Transaction) -> Result<Receipt, BroadcastError> {
        (**self).broadcast(tx).await
    }

    fn chain_id(&self) -> &str {
        (**self).chain_id()
    }
}
