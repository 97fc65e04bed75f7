//! ledger-watch: print events from a node's event endpoint.
//!
//! ```bash
//! # Next 5 blocks
//! ledger-watch --topic NewBlock --count 5
//!
//! # Transactions spending from an account
//! ledger-watch --account 0x1f2e... --kind input
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use ledger_events::predicates::accept_any;
use ledger_events::{ClientConfig, EventClient, WaitOutcome};
use ledger_telemetry::{init_telemetry, TelemetryConfig};
use ledger_types::{Address, Topic};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AccountEvent {
    Input,
    Output,
    Call,
}

/// Watch events published by a ledger node
#[derive(Parser, Debug)]
#[command(name = "ledger-watch")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket endpoint (defaults to LEDGER_WS_URL or ws://127.0.0.1:46657/websocket)
    #[arg(long)]
    endpoint: Option<String>,

    /// Raw topic to subscribe to
    #[arg(long, conflicts_with = "account")]
    topic: Option<String>,

    /// Account whose events to watch
    #[arg(long)]
    account: Option<String>,

    /// Which account events to watch
    #[arg(long, value_enum, default_value = "input")]
    kind: AccountEvent,

    /// Stop after this many events
    #[arg(long, default_value = "10")]
    count: usize,

    /// Wait window per event in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Exit when a window passes without an event
    #[arg(long)]
    exit_on_timeout: bool,
}

impl Args {
    fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::from_env();
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(ms) = self.timeout_ms {
            config.timeout = Duration::from_millis(ms);
        }
        config
    }

    fn topic(&self) -> Result<Topic> {
        match (&self.topic, &self.account) {
            (Some(topic), _) => Ok(Topic::new(topic.as_str())),
            (None, Some(account)) => {
                let address = parse_address(account)?;
                Ok(match self.kind {
                    AccountEvent::Input => Topic::account_input(&address),
                    AccountEvent::Output => Topic::account_output(&address),
                    AccountEvent::Call => Topic::account_call(&address),
                })
            }
            (None, None) => Ok(Topic::new_block()),
        }
    }
}

fn parse_address(raw: &str) -> Result<Address> {
    let prefixed = if raw.starts_with("0x") {
        raw.to_string()
    } else {
        format!("0x{}", raw)
    };
    serde_json::from_value(serde_json::Value::String(prefixed))
        .with_context(|| format!("invalid account address: {}", raw))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _telemetry = init_telemetry(TelemetryConfig::for_service("ledger-watch"))
        .context("failed to initialise logging")?;

    let config = args.config();
    config.validate().context("invalid client configuration")?;
    let topic = args.topic()?;

    let mut client = EventClient::connect(config)
        .await
        .context("failed to connect to event endpoint")?;
    let subscription = client
        .subscribe(&topic)
        .await
        .with_context(|| format!("failed to subscribe to {}", topic))?;
    info!(topic = %topic, subscription_id = %subscription.id(), "Watching");

    let mut printed = 0;
    let result: Result<()> = loop {
        if printed >= args.count {
            break Ok(());
        }
        let outcome = tokio::select! {
            outcome = client.wait(&topic, accept_any()) => outcome,
            _ = tokio::signal::ctrl_c() => break Ok(()),
        };
        match outcome {
            WaitOutcome::Matched(payload) => {
                println!("{}", serde_json::to_string(&payload)?);
                printed += 1;
            }
            WaitOutcome::TimedOut if args.exit_on_timeout => break Ok(()),
            WaitOutcome::TimedOut => {
                if !client.is_connected() {
                    break Err(anyhow::anyhow!("connection closed by node"));
                }
                warn!(topic = %topic, "No event within window");
            }
            WaitOutcome::Errored(e) => break Err(e.into()),
        }
    };

    if client.is_connected() {
        if let Err(e) = client.unsubscribe(subscription).await {
            warn!(error = %e, "Unsubscribe failed");
        }
    }
    client.stop().await;

    if let Err(e) = result {
        bail!("watch ended: {:#}", e);
    }
    Ok(())
}
