//! Telemetry Module
//!
//! Installs the global tracing subscriber.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Adds targets, file names and line numbers to every event
    pub debug: bool,
    /// Filter used when `RUST_LOG` is unset or invalid
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: "info".to_string(),
        }
    }
}

fn env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Installs a registry with an env filter and a fmt layer.
///
/// Fails if a global subscriber is already set.
pub fn init(config: &LogConfig) -> Result<(), TryInitError> {
    let layer = fmt::layer()
        .with_target(config.debug)
        .with_file(config.debug)
        .with_line_number(config.debug);

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(layer)
        .try_init()
}
