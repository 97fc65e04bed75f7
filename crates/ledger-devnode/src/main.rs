//! ledger-devnode: run a development ledger with a WebSocket event endpoint.
//!
//! ```bash
//! # Two funded accounts, one block per second
//! ledger-devnode --account alice=1000000 --account bob=1000
//!
//! # Fast blocks on a free port
//! ledger-devnode --bind 127.0.0.1:0 --block-interval-ms 100
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use ledger_devnode::{DevNode, DevNodeConfig, GenesisAccount};
use ledger_telemetry::{init_telemetry, TelemetryConfig};
use ledger_types::{address_from_label, Address};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Development ledger node
#[derive(Parser, Debug)]
#[command(name = "ledger-devnode")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address of the event endpoint
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Block interval in milliseconds
    #[arg(long)]
    block_interval_ms: Option<u64>,

    /// Chain id bound into transaction ids
    #[arg(long)]
    chain_id: Option<String>,

    /// Genesis account as `<label or 0x address>=<balance>`; repeatable
    #[arg(long = "account", value_parser = parse_account)]
    accounts: Vec<GenesisAccount>,
}

impl Args {
    fn config(&self) -> Result<DevNodeConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("invalid configuration in {}", path.display()))?
            }
            None => DevNodeConfig::default(),
        };
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(ms) = self.block_interval_ms {
            config.block_interval = Some(Duration::from_millis(ms));
        }
        if let Some(chain_id) = &self.chain_id {
            config.chain_id = chain_id.clone();
        }
        config.genesis.extend(self.accounts.iter().cloned());
        Ok(config)
    }
}

fn parse_account(raw: &str) -> Result<GenesisAccount, String> {
    let (name, balance) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected <account>=<balance>, got {}", raw))?;
    let balance: u64 = balance
        .parse()
        .map_err(|_| format!("invalid balance: {}", balance))?;
    let address = if name.starts_with("0x") {
        serde_json::from_value::<Address>(serde_json::Value::String(name.to_string()))
            .map_err(|_| format!("invalid address: {}", name))?
    } else {
        address_from_label(name)
    };
    Ok(GenesisAccount::new(address, balance))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _telemetry = init_telemetry(TelemetryConfig::for_service("ledger-devnode"))
        .context("failed to initialise logging")?;

    let config = args.config()?;
    if config.block_interval.is_none() {
        bail!("block_interval must be set when running the node standalone");
    }

    for account in &config.genesis {
        info!(address = ?account.address, balance = account.balance, "Genesis account");
    }

    let node = DevNode::start(config)
        .await
        .context("failed to start development node")?;
    println!("{}", node.endpoint());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    node.shutdown().await;
    Ok(())
}
