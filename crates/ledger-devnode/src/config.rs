//! Development node configuration with validation.

use ledger_types::{address_from_label, Address};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;

/// Default listen port of the event endpoint.
pub const DEFAULT_PORT: u16 = 46657;

/// Default chain id mixed into transaction hashes.
pub const DEFAULT_CHAIN_ID: &str = "ledger-devnet";

/// Default maximum inbound message size (1MB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Default cap on subscriptions held by one connection.
pub const DEFAULT_MAX_SUBSCRIPTIONS: u32 = 100;

/// Development node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DevNodeConfig {
    /// Listen address of the WebSocket endpoint. Port 0 picks a free port.
    pub bind: SocketAddr,
    /// Interval between produced blocks. `None` leaves block production to
    /// explicit `produce_block` calls.
    #[serde(with = "opt_duration_serde")]
    pub block_interval: Option<Duration>,
    /// Chain id bound into transaction ids
    pub chain_id: String,
    /// Accounts funded at genesis
    pub genesis: Vec<GenesisAccount>,
    /// Maximum inbound message size in bytes
    pub max_message_size: usize,
    /// Maximum subscriptions per connection
    pub max_subscriptions_per_connection: u32,
}

impl Default for DevNodeConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT),
            block_interval: Some(Duration::from_secs(1)),
            chain_id: DEFAULT_CHAIN_ID.to_string(),
            genesis: Vec::new(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_subscriptions_per_connection: DEFAULT_MAX_SUBSCRIPTIONS,
        }
    }
}

impl DevNodeConfig {
    /// Configuration for tests: ephemeral port, manual block production.
    pub fn ephemeral() -> Self {
        Self {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
            block_interval: None,
            ..Self::default()
        }
    }

    pub fn with_block_interval(mut self, interval: Option<Duration>) -> Self {
        self.block_interval = interval;
        self
    }

    pub fn with_account(mut self, account: GenesisAccount) -> Self {
        self.genesis.push(account);
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chain_id.is_empty() {
            return Err(ConfigError::InvalidChainId);
        }

        if matches!(self.block_interval, Some(interval) if interval.is_zero()) {
            return Err(ConfigError::InvalidBlockInterval);
        }

        if self.max_message_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_message_size cannot be 0".into(),
            ));
        }

        if self.max_subscriptions_per_connection == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_subscriptions_per_connection cannot be 0".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for account in &self.genesis {
            if !seen.insert(account.address) {
                return Err(ConfigError::DuplicateAccount(account.address));
            }
        }

        Ok(())
    }
}

/// An account funded at genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub address: Address,
    pub balance: u64,
}

impl GenesisAccount {
    pub fn new(address: Address, balance: u64) -> Self {
        Self { address, balance }
    }

    /// Account at the address derived from `label`.
    pub fn named(label: &str, balance: u64) -> Self {
        Self::new(address_from_label(label), balance)
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("chain_id cannot be empty")]
    InvalidChainId,
    #[error("block_interval cannot be 0")]
    InvalidBlockInterval,
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    #[error("genesis account listed twice: {0:#x}")]
    DuplicateAccount(Address),
}

/// Optional duration serde as `"<n>ms"`, `"<n>s"` or `null`.
mod opt_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_str(&format!("{}ms", d.as_millis())),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|s| parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }

    fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
