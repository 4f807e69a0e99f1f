//! # Logging
//!
//! `tracing-subscriber` setup. `RUST_LOG` wins over the configured level when
//! set, so individual modules can be turned up without a config change.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Output format of log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    /// Anything other than `text`/`pretty` falls back to JSON
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "text" | "pretty" | "plain" => Self::Text,
            _ => Self::Json,
        }
    }
}

/// Default filter directive for a level name such as `INFO`
#[must_use]
pub fn default_directive(level: &str) -> String {
    format!("secret_rotator={}", level.to_lowercase())
}

/// Install the global subscriber
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match LogFormat::parse(format) {
        LogFormat::Json => builder
            .json()
            .with_current_span(true)
            .try_init()
            .map_err(|e| anyhow!("Failed to initialize logging: {e}")),
        LogFormat::Text => builder
            .try_init()
            .map_err(|e| anyhow!("Failed to initialize logging: {e}")),
    }
}
