//! # Structured Logging
//!
//! Structured logging via the `tracing` ecosystem. The engine emits events
//! on its own; a binary embedding it calls [`init_logging`] once.
//!
//! ```rust,ignore
//! use lpi_core::logging::{init_logging, LogConfig, LogFormat};
//!
//! init_logging(&LogConfig { format: LogFormat::Json, ..Default::default() });
//! tracing::info!(period = 12, "integration period complete");
//! ```

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (machine-readable)
    Json,
    /// Pretty format (human-readable, colored)
    #[default]
    Pretty,
    /// Compact format (one line per event)
    Compact,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Include source location (file:line)
    pub source_location: bool,
    /// Include thread names, useful when running workers on a thread pool
    pub thread_names: bool,
    /// Directive filter (e.g., "lpi_core=debug")
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
            source_location: false,
            thread_names: false,
            filter: None,
        }
    }
}

impl LogConfig {
    /// Verbose configuration with per-pulse timing.
    pub fn development() -> Self {
        Self {
            level: LogLevel::Debug,
            source_location: true,
            thread_names: true,
            ..Default::default()
        }
    }

    /// JSON output for batch processing.
    pub fn production() -> Self {
        Self {
            format: LogFormat::Json,
            ..Default::default()
        }
    }

    fn env_filter(&self) -> EnvFilter {
        match self.filter {
            Some(ref custom) => EnvFilter::try_new(custom)
                .unwrap_or_else(|_| EnvFilter::new(self.level.to_string())),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.level.to_string())),
        }
    }
}

/// Initialize the global logging subscriber.
///
/// Subsequent calls are silently ignored.
pub fn init_logging(config: &LogConfig) {
    let filter = config.env_filter();
    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(
                fmt::layer()
                    .json()
                    .with_file(config.source_location)
                    .with_line_number(config.source_location)
                    .with_thread_names(config.thread_names),
            ),
        ),
        LogFormat::Pretty => tracing::subscriber::set_global_default(
            registry.with(
                fmt::layer()
                    .pretty()
                    .with_file(config.source_location)
                    .with_line_number(config.source_location)
                    .with_thread_names(config.thread_names),
            ),
        ),
        LogFormat::Compact => tracing::subscriber::set_global_default(
            registry.with(
                fmt::layer()
                    .compact()
                    .with_file(config.source_location)
                    .with_line_number(config.source_location)
                    .with_thread_names(config.thread_names),
            ),
        ),
    };

    // Already initialized
    let _ = result;
}
