//! Tracing setup for binaries and embedding applications
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! left to the process, through [`init_tracing`] or its own setup.

mod config;

pub use config::{LoggingConfig, LOG_FILTER_ENV, LOG_JSON_ENV};

use crate::error::{MetricsError, Result};
use tracing_subscriber::EnvFilter;

/// Install a global `fmt` subscriber honoring `config`.
///
/// Fails if the filter directives do not parse or a global subscriber is
/// already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter)
        .map_err(|e| MetricsError::LoggingInit(format!("invalid filter '{}': {}", config.filter, e)))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| MetricsError::LoggingInit(e.to_string()))
}
