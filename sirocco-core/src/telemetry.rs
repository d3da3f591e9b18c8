//! Tracing initialization.
//!
//! JSON output for log aggregation by default; pretty output for local
//! development. `RUST_LOG` overrides the configured level directive.

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;

/// Telemetry initialization errors.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber is already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Init(String),
}

/// Installs the global tracing subscriber.
///
/// # Errors
///
/// Returns [`TelemetryError::Init`] if a subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<(), TelemetryError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if config.pretty {
        registry.with(fmt::layer().with_target(true)).try_init()
    } else {
        registry
            .with(fmt::layer().json().flatten_event(true).with_target(true))
            .try_init()
    };

    result.map_err(|e| TelemetryError::Init(e.to_string()))
}
