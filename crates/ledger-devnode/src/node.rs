//! The development node: ledger, event endpoint and block producer.

use crate::config::{ConfigError, DevNodeConfig};
use crate::ledger::{Account, Ledger};
use crate::server::{self, AppState, WS_PATH};
use crate::subscriptions::SubscriptionManager;
use async_trait::async_trait;
use ledger_events::{BroadcastError, Broadcaster};
use ledger_telemetry::{log_block_event, log_event, log_tx_event};
use ledger_types::{Address, Block, BlockHeight, Receipt, Transaction};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, warn};

const COMPONENT: &str = "devnode";

/// Time background tasks get to finish after shutdown is signalled.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Node startup errors.
#[derive(Debug, Error)]
pub enum DevNodeError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// A running development node.
///
/// Dropping the node aborts its tasks; [`DevNode::shutdown`] closes client
/// connections first.
pub struct DevNode {
    config: DevNodeConfig,
    ledger: Arc<Mutex<Ledger>>,
    subscriptions: Arc<SubscriptionManager>,
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DevNode {
    /// Validate `config`, bind the endpoint and start serving.
    pub async fn start(config: DevNodeConfig) -> Result<Self, DevNodeError> {
        config.validate()?;

        let listener = TcpListener::bind(config.bind)
            .await
            .map_err(|source| DevNodeError::Bind {
                addr: config.bind,
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| DevNodeError::Bind {
                addr: config.bind,
                source,
            })?;

        let ledger = Arc::new(Mutex::new(Ledger::new(
            config.chain_id.clone(),
            &config.genesis,
        )));
        let subscriptions = Arc::new(SubscriptionManager::new(
            config.max_subscriptions_per_connection,
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let router = server::router(AppState {
            subscriptions: Arc::clone(&subscriptions),
            max_message_size: config.max_message_size,
            shutdown: shutdown_rx.clone(),
        });

        let mut tasks = Vec::new();
        let mut server_shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = server_shutdown.wait_for(|stopped| *stopped).await;
                })
                .await;
            if let Err(e) = result {
                error!(error = %e, "Event endpoint failed");
            }
        }));

        if let Some(period) = config.block_interval {
            tasks.push(tokio::spawn(produce_blocks(
                period,
                Arc::clone(&ledger),
                Arc::clone(&subscriptions),
                shutdown_rx,
            )));
        }

        log_event!(
            info,
            COMPONENT,
            "Development node started",
            addr = %local_addr,
            chain_id = %config.chain_id,
            accounts = config.genesis.len(),
            block_interval_ms = config.block_interval.map(|d| d.as_millis() as u64)
        );

        Ok(Self {
            config,
            ledger,
            subscriptions,
            local_addr,
            shutdown_tx,
            tasks: Mutex::new(tasks),
        })
    }

    pub fn config(&self) -> &DevNodeConfig {
        &self.config
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// WebSocket URL of the event endpoint.
    pub fn endpoint(&self) -> String {
        format!("ws://{}{}", self.local_addr, WS_PATH)
    }

    pub fn height(&self) -> BlockHeight {
        self.ledger.lock().height()
    }

    pub fn balance(&self, address: &Address) -> u64 {
        self.ledger.lock().balance(address)
    }

    pub fn account(&self, address: &Address) -> Option<Account> {
        self.ledger.lock().account(address).cloned()
    }

    /// Sequence the next transaction signed by `address` must carry.
    pub fn next_sequence(&self, address: &Address) -> u64 {
        self.ledger.lock().next_sequence(address)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.total_subscriptions()
    }

    pub fn connection_count(&self) -> usize {
        self.subscriptions.connection_count()
    }

    pub fn is_running(&self) -> bool {
        !*self.shutdown_tx.borrow()
    }

    /// Commit a block now and publish its events.
    pub fn produce_block(&self) -> Block {
        commit_block(&self.ledger, &self.subscriptions)
    }

    /// Close every client connection and stop the node's tasks.
    pub async fn shutdown(&self) {
        if self.shutdown_tx.send_replace(true) {
            return;
        }
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for mut task in tasks {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                warn!("Node task did not stop in time, aborting");
                task.abort();
            }
        }
        log_event!(info, COMPONENT, "Development node stopped", addr = %self.local_addr);
    }
}

impl Drop for DevNode {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

#[async_trait]
impl Broadcaster for DevNode {
    async fn broadcast(&self, tx: Transaction) -> Result<Receipt, BroadcastError> {
        if !self.is_running() {
            return Err(BroadcastError::Unavailable("node is shut down".into()));
        }
        let result = self.ledger.lock().execute(&tx);
        match result {
            Ok(receipt) => {
                log_tx_event!(
                    debug,
                    COMPONENT,
                    "Transaction accepted",
                    receipt.tx_hash,
                    kind = tx.kind()
                );
                Ok(receipt)
            }
            Err(e) => {
                log_tx_event!(
                    warn,
                    COMPONENT,
                    "Transaction rejected",
                    tx.hash(&self.config.chain_id),
                    reason = %e
                );
                Err(BroadcastError::Rejected(e.to_string()))
            }
        }
    }

    fn chain_id(&self) -> &str {
        &self.config.chain_id
    }
}

/// Commit under the ledger lock so events of consecutive blocks are
/// published in order.
fn commit_block(ledger: &Mutex<Ledger>, subscriptions: &SubscriptionManager) -> Block {
    let mut ledger = ledger.lock();
    let (block, events) = ledger.commit();
    let mut delivered = 0;
    for event in &events {
        delivered += subscriptions.publish(&event.topic, &event.payload);
    }
    log_block_event!(
        debug,
        COMPONENT,
        "Committed block",
        block.height,
        block.hash,
        num_txs = block.num_txs,
        events = events.len(),
        delivered = delivered
    );
    block
}

async fn produce_blocks(
    period: Duration,
    ledger: Arc<Mutex<Ledger>>,
    subscriptions: Arc<SubscriptionManager>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                commit_block(&ledger, &subscriptions);
            }
            _ = shutdown.wait_for(|stopped| *stopped) => break,
        }
    }
}
