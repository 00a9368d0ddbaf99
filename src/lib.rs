//! record-reformer library
//!
//! This crate re-tags tagged, timestamped records and rebuilds their bodies
//! from configured templates, for use inline in a log or event pipeline.

pub mod cli;
pub mod config;
pub mod error;
pub mod io;
pub mod metrics;
pub mod transformer;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the logging subsystem
///
/// Logs are written to stderr; stdout is reserved for emitted events.
///
/// # Arguments
/// * `level` - Log level string (trace, debug, info, warn, error)
/// * `json` - Emit JSON log lines instead of human-readable text
///
/// # Errors
/// Returns an error if the logging system fails to initialize
pub fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    result.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
