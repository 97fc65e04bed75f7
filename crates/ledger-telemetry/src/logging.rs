//! Structured logging setup.
//!
//! Console logs are either human readable (development) or JSON with stable
//! fields (containers, log shippers):
//! - `timestamp`, `level`, `target`
//! - `component`: emitting component (registry, waiter, devnode, ...)
//! - `topic`, `subscription_id`, `block_height`, `tx_hash` where relevant

use crate::{TelemetryConfig, TelemetryError};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Handle returned once the global subscriber is installed.
pub struct StructuredLogger {
    service_name: String,
}

impl StructuredLogger {
    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

/// Install the global tracing subscriber described by `config`.
pub fn init_logging(config: &TelemetryConfig) -> Result<StructuredLogger, TelemetryError> {
    let env_filter = EnvFilter::try_new(&config.log_level)
        .map_err(|e| TelemetryError::Config(format!("invalid log filter: {}", e)))?;

    let console_layer = if config.console_output {
        let base = fmt::layer().with_target(true);
        let layer = match (config.json_logs, config.test_writer) {
            (true, true) => base
                .json()
                .with_thread_ids(true)
                .with_test_writer()
                .with_filter(env_filter)
                .boxed(),
            (true, false) => base
                .json()
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(env_filter)
                .boxed(),
            (false, true) => base.with_test_writer().with_filter(env_filter).boxed(),
            (false, false) => base.with_ansi(true).with_filter(env_filter).boxed(),
        };
        Some(layer)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .try_init()
        .map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))?;

    tracing::debug!(
        service = %config.service_name,
        json_logs = config.json_logs,
        log_level = %config.log_level,
        "Structured logging initialized"
    );

    Ok(StructuredLogger {
        service_name: config.service_name.clone(),
    })
}

/// Log with a `component` field.
#[macro_export]
macro_rules! log_event {
    (info, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::info!(
            component = $component,
            $($($field)*,)?
            $msg
        )
    };

    (warn, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::warn!(
            component = $component,
            $($($field)*,)?
            $msg
        )
    };

    (error, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::error!(
            component = $component,
            $($($field)*,)?
            $msg
        )
    };

    (debug, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::debug!(
            component = $component,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log a block-related event with standard fields.
#[macro_export]
macro_rules! log_block_event {
    ($level:ident, $component:expr, $msg:expr, $block_height:expr, $block_hash:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            component = $component,
            block_height = $block_height,
            block_hash = ?$block_hash,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log a transaction-related event with standard fields.
#[macro_export]
macro_rules! log_tx_event {
    ($level:ident, $component:expr, $msg:expr, $tx_hash:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            component = $component,
            tx_hash = ?$tx_hash,
            $($($field)*,)?
            $msg
        )
    };
}
