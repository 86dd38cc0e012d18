//! Structured logging setup

use rtsphls_core::{RelayError, RelayResult};
use tracing_subscriber::EnvFilter;

/// Logging options
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log relay crates at debug level when `RUST_LOG` is unset
    pub debug: bool,
    /// Extra filter directives appended to the default, e.g. `tokio_tungstenite=warn`
    pub directives: Vec<String>,
    /// Include the module path in each line
    pub with_target: bool,
    /// Colourised output
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            debug: false,
            directives: Vec::new(),
            with_target: true,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Default settings with debug logging switched on or off
    pub fn with_debug(debug: bool) -> Self {
        Self {
            debug,
            ..Self::default()
        }
    }

    /// Filter used when `RUST_LOG` is not set
    pub fn default_filter(&self) -> String {
        let level = if self.debug { "debug" } else { "info" };
        std::iter::once(level.to_string())
            .chain(self.directives.iter().cloned())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over the configured default filter. Fails if a
/// subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> RelayResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.default_filter()).map_err(|e| {
            RelayError::Initialization {
                reason: format!("invalid log filter: {}", e),
            }
        })?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_ansi(config.ansi)
        .try_init()
        .map_err(|e| RelayError::Initialization {
            reason: format!("logging already initialised: {}", e),
        })?;

    tracing::debug!("Logging initialised");
    Ok(())
}
