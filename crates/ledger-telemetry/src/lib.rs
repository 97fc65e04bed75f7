//! # Ledger Telemetry
//!
//! Structured logging for the ledger event client, the development node and
//! the test suite.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ledger_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(TelemetryConfig::from_env())?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_SERVICE_NAME` | `ledger-events` | Service name in logs |
//! | `LEDGER_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `LEDGER_JSON_LOGS` | `false` | JSON output (defaults on inside containers) |
//! | `LEDGER_CONSOLE_OUTPUT` | `true` | Disable to silence console output |

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::StructuredLogger;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("A global subscriber is already installed: {0}")]
    AlreadyInitialized(String),
}

/// Initialize structured logging.
///
/// Returns a guard that should be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let logger = logging::init_logging(&config)?;
    Ok(TelemetryGuard { logger })
}

/// Install test logging once per process; later calls are no-ops.
pub fn init_test_logging() {
    let _ = logging::init_logging(&TelemetryConfig::for_tests());
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    logger: StructuredLogger,
}

impl TelemetryGuard {
    pub fn service_name(&self) -> &str {
        self.logger.service_name()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::debug!(service = %self.logger.service_name(), "Shutting down telemetry");
    }
}
