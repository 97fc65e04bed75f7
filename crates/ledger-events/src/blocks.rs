//! Block-driven waits.
//!
//! Helpers built on `NewBlock` subscriptions: wait for a block satisfying a
//! condition, for the `n`th next block, or for the block after a broadcast
//! transaction has been committed. Each helper subscribes, waits once and
//! unsubscribes.

use crate::broadcast::Broadcaster;
use crate::client::EventClient;
use crate::config::ConfigError;
use crate::error::{ClientError, ClientResult, PredicateMismatch, WaitError};
use crate::predicates::block_matching;
use ledger_types::{Block, BlockHeight, EventPayload, Receipt, Topic, Transaction};
use std::future::Future;
use tracing::{debug, warn};

/// Block condition that holds for the first block strictly above the first
/// height it observes.
///
/// The first block seen may already be in flight when the trigger runs; the
/// one after it is guaranteed to follow the trigger.
pub fn next_block() -> impl FnMut(&Block) -> bool {
    let mut initial: Option<BlockHeight> = None;
    move |block: &Block| match initial {
        None => {
            initial = Some(block.height);
            false
        }
        Some(height) => block.height > height,
    }
}

impl EventClient {
    /// Run `trigger`, then wait for a block that satisfies `condition`.
    pub async fn run_then_wait_for_block<T, F, C>(
        &mut self,
        condition: C,
        trigger: F,
    ) -> ClientResult<(T, Block)>
    where
        F: Future<Output = T>,
        C: FnMut(&Block) -> bool,
    {
        let topic = Topic::new_block();
        let (value, outcome) = self
            .subscribe_and_wait_for_next(&topic, trigger, block_matching(condition))
            .await?;
        let block = into_block(outcome.into_result(&topic, self.window())?)?;
        debug!(height = block.height, "Block condition met");
        Ok((value, block))
    }

    /// Wait until `n` further blocks have been committed and return the last.
    ///
    /// All `n` blocks must arrive within one window. `n` must be at least 1;
    /// zero is rejected before anything is sent.
    pub async fn wait_n_blocks(&mut self, n: u64) -> ClientResult<Block> {
        if n == 0 {
            return Err(ConfigError::InvalidLimit("block count cannot be 0".into()).into());
        }
        let mut seen = 0u64;
        let (_, block) = self
            .run_then_wait_for_block(
                move |_: &Block| {
                    seen += 1;
                    seen >= n
                },
                async {},
            )
            .await?;
        Ok(block)
    }

    /// Broadcast `tx`, then wait for the block after the one in flight.
    ///
    /// A broadcast failure is returned as is, without waiting.
    pub async fn broadcast_and_wait_for_block<B>(
        &mut self,
        broadcaster: &B,
        tx: Transaction,
    ) -> ClientResult<(Receipt, Block)>
    where
        B: Broadcaster + ?Sized,
    {
        let topic = Topic::new_block();
        let subscription = self.subscribe(&topic).await?;

        let receipt = match broadcaster.broadcast(tx).await {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(error = %e, "Broadcast failed");
                if let Err(unsub) = self.unsubscribe(subscription).await {
                    warn!(error = %unsub, "Unsubscribe after failed broadcast failed");
                }
                return Err(e.into());
            }
        };
        debug!(tx_hash = ?receipt.tx_hash, "Broadcast accepted");

        let outcome = self.wait(&topic, block_matching(next_block())).await;
        if let Err(e) = self.unsubscribe(subscription).await {
            warn!(error = %e, "Unsubscribe after block wait failed");
        }
        let block = into_block(outcome.into_result(&topic, self.window())?)?;
        Ok((receipt, block))
    }
}

fn into_block(payload: EventPayload) -> ClientResult<Block> {
    match payload {
        EventPayload::NewBlock(data) => Ok(data.block),
        other => Err(ClientError::Wait(WaitError::Mismatch {
            topic: Topic::new_block(),
            source: PredicateMismatch::UnexpectedPayload {
                expected: "newBlock",
                got: other.kind(),
            },
        })),
    }
}
