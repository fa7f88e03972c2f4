//! Tracing and logging setup shared by binaries and tests.

/// Environment-driven configuration.
pub mod config;

/// Tracing subscriber installation.
pub mod tracing;

pub use config::{ConfigError, LogFormat, ObservabilityConfig};

/// Initialize process-wide tracing from the environment.
///
/// Safe to call multiple times; subsequent calls become no-ops. An invalid
/// `STRUCTVAL_LOG_FORMAT` falls back to the default format and is reported
/// through the installed subscriber.
pub fn init() {
    let (config, err) = ObservabilityConfig::from_env_or_default();
    tracing::init(&config);

    if let Some(err) = err {
        ::tracing::warn!(error = %err, "invalid observability configuration, using defaults");
    }
}
