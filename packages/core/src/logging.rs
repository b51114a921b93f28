//! Tracing subscriber bootstrap
//!
//! The library itself only emits `tracing` events. Binaries and tests that
//! want to see them call [`init_logging`] once at startup.

use crate::config::LoggingConfig;
use crate::services::error::{RepositoryError, Result};
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the configured filter directive
pub const LOG_ENV_VAR: &str = "NODETREE_LOG";

/// Install a `fmt` subscriber filtered by `$NODETREE_LOG`, or by the
/// configured directive when the variable is unset.
///
/// Calling it again after a subscriber has been installed is harmless.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_env(LOG_ENV_VAR) {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter).map_err(|e| {
            RepositoryError::configuration(format!(
                "Invalid log filter \"{}\": {}",
                config.filter, e
            ))
        })?,
    };

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_err()
    {
        tracing::debug!("Tracing subscriber already installed");
    }
    Ok(())
}
