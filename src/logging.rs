//! Logging bootstrap for the `qrdb` binary
//!
//! The library only emits `tracing` events; installing a subscriber is left to
//! the embedding program.

use std::fs::File;
use std::sync::Mutex;

use thiserror::Error;
use tracing_subscriber::{prelude::*, EnvFilter};

use crate::config::LoggingConfig;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to create log file {path}: {source}")]
    LogFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid log filter '{0}'")]
    Filter(String),
    #[error("Logging already initialized")]
    AlreadyInitialized,
}

/// Install the global subscriber: stderr, plus a file when configured
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|_| LoggingError::Filter(config.level.clone()))?,
    };

    if config.log_to_file {
        let file = File::create(&config.log_file_path).map_err(|source| LoggingError::LogFile {
            path: config.log_file_path.clone(),
            source,
        })?;
        let file_appender = tracing_subscriber::fmt::layer()
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_writer(Mutex::new(file));

        tracing_subscriber::registry()
            .with(filter)
            .with(file_appender)
            .with(console_appender())
            .try_init()
            .map_err(|_| LoggingError::AlreadyInitialized)
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(console_appender())
            .try_init()
            .map_err(|_| LoggingError::AlreadyInitialized)
    }
}

// stderr, so command output on stdout stays machine readable
fn console_appender<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
}
