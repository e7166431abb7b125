//! Structured JSON logging setup using tracing.
//!
//! Hosts embedding the reconciler call [`init_logging`] once at startup.
//! `RUST_LOG`, when set, takes precedence over the supplied filter.

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    InvalidFilter(#[from] tracing_subscriber::filter::ParseError),

    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}

/// Initialize the global subscriber with JSON output.
///
/// # Arguments
///
/// * `filter` - Default filter directive (e.g., "info,ferrite_sync=debug")
pub fn init_logging(filter: &str) -> Result<(), LoggingError> {
    let filter_layer = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::try_new(filter)?,
    };

    let fmt_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter_layer)
        .try_init()?;

    tracing::info!(filter = %filter, "Logging initialized");
    Ok(())
}
