//! Logging setup.
//!
//! Installs a global `tracing` subscriber: an `EnvFilter` (from `RUST_LOG`
//! when set, otherwise the configured directive), a stderr fmt layer and,
//! when a directory is configured, a non-blocking daily log file.
//!
//! The returned [`WorkerGuard`] flushes the file writer on drop and must be
//! kept alive for the lifetime of the program.

use std::io;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Errors installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    Filter(String),

    #[error("failed to install subscriber: {0}")]
    Subscriber(String),

    #[error("failed to prepare log directory: {0}")]
    Io(#[from] io::Error),
}

/// Build the filter, preferring `RUST_LOG`.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => parse_filter(&config.filter),
    }
}

/// Parse an `EnvFilter` directive string.
pub fn parse_filter(directive: &str) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_new(directive).map_err(|e| LoggingError::Filter(e.to_string()))
}

/// Install the global subscriber.
///
/// Returns the file writer's guard when file logging is enabled.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>, LoggingError> {
    let filter = build_filter(config)?;
    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(config.ansi)
        .with_target(true);

    match &config.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory)?;
            let appender = tracing_appender::rolling::daily(directory, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer().with_writer(writer).with_ansi(false);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(file_layer)
                .try_init()
                .map_err(|e| LoggingError::Subscriber(e.to_string()))?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .try_init()
                .map_err(|e| LoggingError::Subscriber(e.to_string()))?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter_accepts_default_directive() {
        let filter = parse_filter(&LoggingConfig::default().filter).unwrap();
        assert!(filter.to_string().contains("mapcompose=info"));
    }

    #[test]
    fn test_parse_filter_rejects_garbage() {
        assert!(matches!(
            parse_filter("mapcompose=notalevel").unwrap_err(),
            LoggingError::Filter(_)
        ));
    }

    #[test]
    fn test_second_init_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig::default()
            .with_filter("mapcompose=debug")
            .with_directory(dir.path().join("logs"));

        // Only one global subscriber can exist per process; whichever call
        // loses must report an error rather than panic.
        let _first = init_logging(&config);
        let second = init_logging(&config);
        assert!(matches!(second, Err(LoggingError::Subscriber(_))));
        assert!(dir.path().join("logs").is_dir());
    }
}
