//! Client configuration with validation.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default event endpoint of a local node.
pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:46657/websocket";

/// Default window for subscription correlation and event waits.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default capacity of the inbound frame queue.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Default maximum inbound frame size (1MB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Event client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket endpoint of the node (`ws://` or `wss://`)
    pub endpoint: String,
    /// Single window used for subscribe correlation and for every wait
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
    /// Inbound frames buffered between the socket reader and the consumer
    pub channel_capacity: usize,
    /// Frames above this size are a transport fault
    pub max_frame_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ClientConfig {
    /// Configuration for `endpoint` with defaults elsewhere.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Override the wait window.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create configuration from environment variables.
    ///
    /// - `LEDGER_WS_URL`: endpoint (default: ws://127.0.0.1:46657/websocket)
    /// - `LEDGER_TIMEOUT_MS`: wait window in milliseconds (default: 2000)
    /// - `LEDGER_CHANNEL_CAPACITY`: inbound queue capacity (default: 1000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            endpoint: env::var("LEDGER_WS_URL").unwrap_or(defaults.endpoint),
            timeout: env::var("LEDGER_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
            channel_capacity: env::var("LEDGER_CHANNEL_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.channel_capacity),
            max_frame_size: defaults.max_frame_size,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.endpoint.starts_with("ws://") || self.endpoint.starts_with("wss://")) {
            return Err(ConfigError::InvalidEndpoint(self.endpoint.clone()));
        }

        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout("timeout cannot be 0".into()));
        }

        if self.channel_capacity == 0 {
            return Err(ConfigError::InvalidLimit(
                "channel_capacity cannot be 0".into(),
            ));
        }

        if self.max_frame_size == 0 {
            return Err(ConfigError::InvalidLimit("max_frame_size cannot be 0".into()));
        }

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid endpoint (expected ws:// or wss://): {0}")]
    InvalidEndpoint(String),
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
}

/// Duration serde as `"<n>ms"`, `"<n>s"`, `"<n>m"` or plain seconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
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
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
