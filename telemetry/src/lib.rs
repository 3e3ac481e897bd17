//! Tracing setup shared by the bulwark binaries and tests.
//!
//! [`init_tracing`] installs the global subscriber once at startup.
//! [`LogCapture`] keeps recent output in memory so tests can assert on the
//! structured events the library emits.

mod capture;

pub use capture::{LogCapture, LogCaptureWriter, LogCaptureMakeWriter};

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Output format of the global subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable single-line events.
    #[default]
    Pretty,
    /// One JSON object per line, event fields flattened to the top level.
    Json,
}

/// The `[logging]` section of the bulwark configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingOptions {
    /// `EnvFilter` directive used when `RUST_LOG` is unset or invalid.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log filter {directive:?}: {message}")]
    InvalidFilter { directive: String, message: String },

    #[error("global tracing subscriber already installed: {0}")]
    AlreadyInitialized(String),
}

fn filter_for(options: &LoggingOptions) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&options.level).map_err(|err| TelemetryError::InvalidFilter {
        directive: options.level.clone(),
        message: err.to_string(),
    })
}

/// Install the global subscriber. Events go to stderr so stdout stays free
/// for command output.
pub fn init_tracing(options: &LoggingOptions) -> Result<(), TelemetryError> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter_for(options)?)
        .with_writer(std::io::stderr);

    let installed = match options.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
    };
    installed.map_err(|err| TelemetryError::AlreadyInitialized(err.to_string()))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;

    #[test]
    fn invalid_level_is_reported() {
        let options = LoggingOptions {
            level: "info,[".to_string(),
            format: LogFormat::Json,
        };
        // RUST_LOG is not set by the test harness.
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(matches!(
                filter_for(&options),
                Err(TelemetryError::InvalidFilter { .. })
            ));
        }
    }

    #[test]
    fn default_options() {
        let options = LoggingOptions::default();
        assert_eq!(options.level, "info");
        assert_eq!(options.format, LogFormat::Pretty);
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: LoggingOptions = serde_json::from_str(r#"{"format": "json"}"#).unwrap();
        assert_eq!(options.level, "info");
        assert_eq!(options.format, LogFormat::Json);
        assert!(serde_json::from_str::<LoggingOptions>(r#"{"format": "xml"}"#).is_err());
    }
}
