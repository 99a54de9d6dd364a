//! Tracing subscriber setup for the server binary.

use serde::Deserialize;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingSettings;

/// Crates that are chatty at `info` and below.
const QUIET_DEPENDENCIES: &[&str] = &["sqlx=warn", "tungstenite=warn", "tokio_tungstenite=warn"];

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line human-readable output.
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("invalid log filter: {0}")]
    InvalidFilter(String),
    #[error("subscriber already initialized")]
    AlreadyInitialized,
}

/// Builds the event filter. `RUST_LOG`, when set, replaces `level`.
pub fn build_filter(level: &str, rust_log: Option<&str>) -> Result<EnvFilter, LogError> {
    let mut directives = match rust_log {
        Some(env) if !env.trim().is_empty() => env.to_string(),
        _ => level.to_string(),
    };
    for quiet in QUIET_DEPENDENCIES {
        let target = quiet.split('=').next().unwrap_or_default();
        if !directives.contains(target) {
            directives.push(',');
            directives.push_str(quiet);
        }
    }
    EnvFilter::try_new(&directives).map_err(|e| LogError::InvalidFilter(e.to_string()))
}

/// Installs the global subscriber. Call once at startup.
pub fn init(settings: &LoggingSettings) -> Result<(), LogError> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = build_filter(&settings.level, rust_log.as_deref())?;
    let registry = tracing_subscriber::registry().with(filter);

    match settings.format {
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_target(true))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init(),
    }
    .map_err(|_| LogError::AlreadyInitialized)
}
