//! Logging setup for applications embedding the control point
//!
//! The library only emits `tracing` events; nothing is printed unless the
//! application installs a subscriber, for instance through this module.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Crates of this workspace, so a default filter stays quiet about warp/hyper.
const CRATES: [&str; 4] = [
    "upnp_control",
    "soap_client",
    "callback_server",
    "upnp_description",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// No subscriber is installed
    Silent,
    /// Compact stderr output, `info` by default
    Development,
    /// Wire traffic and source locations, `debug` by default
    Debug,
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),
}

/// Install a global subscriber for `mode`.
///
/// `UPNP_LOG_LEVEL` (or else `RUST_LOG`) overrides the mode's default filter.
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    let layer = match mode {
        LoggingMode::Silent => return Ok(()),
        LoggingMode::Development => fmt::layer().with_target(false).compact().boxed(),
        LoggingMode::Debug => fmt::layer()
            .with_file(true)
            .with_line_number(true)
            .boxed(),
    };

    let directives = filter_directives(
        std::env::var("UPNP_LOG_LEVEL").ok(),
        std::env::var("RUST_LOG").ok(),
        mode,
    );

    Registry::default()
        .with(layer)
        .with(EnvFilter::new(directives))
        .try_init()
        .map_err(|e| LoggingError::TracingInit(e.to_string()))
}

/// Initialize logging from `UPNP_LOG_MODE` (`development` or `debug`;
/// anything else is silent).
pub fn init_logging_from_env() -> Result<(), LoggingError> {
    init_logging(parse_mode(std::env::var("UPNP_LOG_MODE").ok().as_deref()))
}

fn parse_mode(value: Option<&str>) -> LoggingMode {
    match value.map(str::trim) {
        Some(mode) if mode.eq_ignore_ascii_case("development") => LoggingMode::Development,
        Some(mode) if mode.eq_ignore_ascii_case("debug") => LoggingMode::Debug,
        _ => LoggingMode::Silent,
    }
}

fn filter_directives(
    upnp_level: Option<String>,
    rust_log: Option<String>,
    mode: LoggingMode,
) -> String {
    if let Some(directives) = upnp_level.or(rust_log).filter(|d| !d.trim().is_empty()) {
        return directives;
    }

    let level = match mode {
        LoggingMode::Debug => "debug",
        _ => "info",
    };
    CRATES
        .iter()
        .map(|krate| format!("{}={}", krate, level))
        .collect::<Vec<_>>()
        .join(",")
}
