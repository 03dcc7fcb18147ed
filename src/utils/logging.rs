//! Structured logging setup.
//!
//! Builds a `tracing-subscriber` registry from a [`LoggingConfig`]:
//! `RUST_LOG` wins over the configured level when set, console output is
//! plain or JSON, and file output goes through a non-blocking
//! `tracing-appender` writer.

use std::path::Path;

use tracing::{info, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;
use crate::error::{ProtocolError, Result};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn level_directive(level: Level) -> &'static str {
    match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    }
}

/// Environment filter: `RUST_LOG` if present, else the configured level.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(config.log_level)))
}

/// Install the global subscriber. Keep the returned guard alive for as long
/// as file logging should flush.
///
/// # Errors
/// Returns `ProtocolError::ConfigError` when file output is requested
/// without a usable path, or a global subscriber is already installed
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guard = None;

    if config.log_to_console {
        let layer = if config.json_format {
            fmt::layer().json().with_target(true).boxed()
        } else {
            fmt::layer().with_target(true).boxed()
        };
        layers.push(layer);
    }

    if config.log_to_file {
        let path = config.log_file_path.as_deref().ok_or_else(|| {
            ProtocolError::ConfigError("log_file_path must be set for file logging".into())
        })?;
        let path = Path::new(path);
        let file_name = path.file_name().ok_or_else(|| {
            ProtocolError::ConfigError(format!("Invalid log file path: {}", path.display()))
        })?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let appender = tracing_appender::rolling::never(dir, file_name);
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        guard = Some(file_guard);

        let layer = if config.json_format {
            fmt::layer().json().with_writer(writer).with_ansi(false).boxed()
        } else {
            fmt::layer().with_writer(writer).with_ansi(false).boxed()
        };
        layers.push(layer);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter(config))
        .try_init()
        .map_err(|e| ProtocolError::ConfigError(format!("Failed to install subscriber: {e}")))?;

    info!(app = %config.app_name, "Logging initialised");
    Ok(guard)
}
