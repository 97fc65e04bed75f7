//! # Test Network Fixture
//!
//! [`TestNet`] starts a development node with named, funded accounts and
//! hands out event clients connected to it. Every test builds its own
//! network; nothing is shared between tests.
//!
//! ```rust,ignore
//! let net = TestNet::builder()
//!     .account("alice", 1_000_000)
//!     .account("bob", 0)
//!     .build()
//!     .await?;
//! let mut client = net.client().await?;
//! let tx = net.send_tx("alice", net.address("bob"), 100);
//! ```

use anyhow::{Context, Result};
use ledger_devnode::{DevNode, DevNodeConfig, GenesisAccount};
use ledger_events::{Broadcaster, ClientConfig, EventClient};
use ledger_types::{
    address_from_label, Address, Block, Bytes, CallTx, Receipt, SendTx, Transaction, TxInput,
    TxOutput,
};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

/// Wait window used unless a test overrides it.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Gas limit of calls built by [`TestNet::call_tx`].
pub const GAS_LIMIT: u64 = 1000;

/// Fee of calls built by [`TestNet::call_tx`].
pub const FEE: u64 = 1000;

/// Builder for [`TestNet`].
#[derive(Debug, Clone)]
pub struct TestNetBuilder {
    accounts: BTreeMap<String, u64>,
    block_interval: Option<Duration>,
    timeout: Duration,
    max_subscriptions: Option<u32>,
}

impl Default for TestNetBuilder {
    fn default() -> Self {
        Self {
            accounts: BTreeMap::new(),
            block_interval: None,
            timeout: DEFAULT_TIMEOUT,
            max_subscriptions: None,
        }
    }
}

impl TestNetBuilder {
    /// Fund the account named `name` at genesis.
    pub fn account(mut self, name: &str, balance: u64) -> Self {
        self.accounts.insert(name.to_string(), balance);
        self
    }

    /// Produce blocks on a timer. Without it blocks are only committed by
    /// [`TestNet::commit`].
    pub fn block_interval(mut self, interval: Duration) -> Self {
        self.block_interval = Some(interval);
        self
    }

    /// Window for client correlation and waits.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_subscriptions(mut self, max: u32) -> Self {
        self.max_subscriptions = Some(max);
        self
    }

    pub async fn build(self) -> Result<TestNet> {
        ledger_telemetry::init_test_logging();

        let mut config = DevNodeConfig::ephemeral().with_block_interval(self.block_interval);
        if let Some(max) = self.max_subscriptions {
            config.max_subscriptions_per_connection = max;
        }
        let mut accounts = BTreeMap::new();
        for (name, balance) in &self.accounts {
            let address = address_from_label(name);
            config.genesis.push(GenesisAccount::new(address, *balance));
            accounts.insert(name.clone(), address);
        }

        let node = DevNode::start(config)
            .await
            .context("failed to start development node")?;
        info!(endpoint = %node.endpoint(), accounts = accounts.len(), "Test network started");
        Ok(TestNet {
            node,
            timeout: self.timeout,
            accounts,
        })
    }
}

/// A running development node plus the named accounts funded on it.
pub struct TestNet {
    node: DevNode,
    timeout: Duration,
    accounts: BTreeMap<String, Address>,
}

impl TestNet {
    pub fn builder() -> TestNetBuilder {
        TestNetBuilder::default()
    }

    pub fn node(&self) -> &DevNode {
        &self.node
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Address of the account named `name`. Names not funded at genesis
    /// still map to a stable address.
    pub fn address(&self, name: &str) -> Address {
        self.accounts
            .get(name)
            .copied()
            .unwrap_or_else(|| address_from_label(name))
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(self.node.endpoint()).with_timeout(self.timeout)
    }

    /// A fresh client connected to the node.
    pub async fn client(&self) -> Result<EventClient> {
        EventClient::connect(self.client_config())
            .await
            .context("failed to connect event client")
    }

    /// Transfer `amount` from `from` to `to`, with `from`'s next sequence.
    pub fn send_tx(&self, from: &str, to: Address, amount: u64) -> Transaction {
        let address = self.address(from);
        Transaction::Send(SendTx {
            inputs: vec![TxInput {
                address,
                amount,
                sequence: self.node.next_sequence(&address),
            }],
            outputs: vec![TxOutput { address: to, amount }],
        })
    }

    /// Call `contract` (or deploy `data` as code when `None`) from `from`.
    pub fn call_tx(
        &self,
        from: &str,
        contract: Option<Address>,
        data: Bytes,
        amount: u64,
    ) -> Transaction {
        let address = self.address(from);
        Transaction::Call(CallTx {
            input: TxInput {
                address,
                amount,
                sequence: self.node.next_sequence(&address),
            },
            address: contract,
            gas_limit: GAS_LIMIT,
            fee: FEE,
            data,
        })
    }

    pub async fn broadcast(&self, tx: Transaction) -> Result<Receipt> {
        self.node
            .broadcast(tx)
            .await
            .context("transaction rejected")
    }

    /// Broadcast `tx` and commit it in a block right away.
    pub async fn broadcast_and_commit(&self, tx: Transaction) -> Result<Receipt> {
        let receipt = self.broadcast(tx).await?;
        self.commit();
        Ok(receipt)
    }

    /// Deploy `code` from `from` and commit it; returns the contract address.
    pub async fn deploy(&self, from: &str, code: Bytes, amount: u64) -> Result<Address> {
        let receipt = self
            .broadcast_and_commit(self.call_tx(from, None, code, amount))
            .await?;
        receipt
            .contract_address
            .context("deployment returned no contract address")
    }

    /// Commit a block now.
    pub fn commit(&self) -> Block {
        self.node.produce_block()
    }

    pub async fn shutdown(&self) {
        self.node.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_builder_funds_named_accounts() {
        let net = TestNet::builder()
            .account("alice", 500)
            .account("bob", 7)
            .build()
            .await
            .unwrap();

        assert_eq!(net.node().balance(&net.address("alice")), 500);
        assert_eq!(net.node().balance(&net.address("bob")), 7);
        assert_eq!(net.address("carol"), address_from_label("carol"));
        net.shutdown().await;
    }

    #[tokio::test]
    async fn test_send_tx_tracks_sequence() {
        let net = TestNet::builder()
            .account("alice", 500)
            .build()
            .await
            .unwrap();
        let bob = net.address("bob");

        net.broadcast(net.send_tx("alice", bob, 1)).await.unwrap();
        let Transaction::Send(next) = net.send_tx("alice", bob, 1) else {
            panic!("expected send transaction");
        };
        assert_eq!(next.inputs[0].sequence, 2);
        net.shutdown().await;
    }
}
