use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use tracing::debug;

use super::ResilienceConfig;
use super::error::{ConfigError, Result};

const FILE_NAME: &str = "bulwark.toml";
const ENV_PREFIX: &str = "BULWARK";

/// Configuration loader with layered merging support
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Use this file instead of searching the standard locations. The file
    /// is always parsed as TOML, whatever its extension.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load configuration with layered merging:
    /// 1. Defaults (from `ResilienceConfig::default`)
    /// 2. The config file, if one was set
    /// 3. Environment variables (`BULWARK_` prefix, `__` between sections)
    ///
    /// The merged result is validated before it is returned.
    pub fn load(&self) -> Result<ResilienceConfig> {
        let mut builder = Config::builder();

        let defaults_json = serde_json::to_string(&ResilienceConfig::default())?;
        builder = builder.add_source(File::from_str(&defaults_json, FileFormat::Json));

        if let Some(path) = &self.config_path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Toml));
        }

        // Example: BULWARK_CIRCUIT_BREAKER__FAILURE_THRESHOLD=7
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: ResilienceConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Locate the config file in standard locations:
    /// 1. Current directory: ./bulwark.toml
    /// 2. XDG config: ~/.config/bulwark/config.toml
    /// 3. Home directory: ~/.bulwark.toml
    pub fn find_config_file() -> Option<PathBuf> {
        let cwd_config = PathBuf::from(".").join(FILE_NAME);
        if cwd_config.exists() {
            return Some(cwd_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("bulwark").join("config.toml");
            if xdg_config.exists() {
                return Some(xdg_config);
            }
        }

        if let Some(home_dir) = dirs::home_dir() {
            let home_config = home_dir.join(format!(".{FILE_NAME}"));
            if home_config.exists() {
                return Some(home_config);
            }
        }

        None
    }

    /// Load configuration from the first standard location that exists,
    /// or from defaults and environment alone.
    pub fn load_default() -> Result<ResilienceConfig> {
        let loader = match Self::find_config_file() {
            Some(path) => ConfigLoader::new().with_file(path),
            None => ConfigLoader::new(),
        };
        loader.load()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use crate::alerts::AlertCategory;
    use crate::config::LogFormat;
    use crate::retry::RetryStrategy;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use std::env;
    use std::time::Duration;

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bulwark.toml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    #[serial]
    fn defaults_only() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config, ResilienceConfig::default());
    }

    #[test]
    #[serial]
    fn env_overrides_defaults() {
        unsafe {
            env::set_var("BULWARK_CIRCUIT_BREAKER__FAILURE_THRESHOLD", "7");
            env::set_var("BULWARK_RETRY__API__MAX_ATTEMPTS", "6");
        }
        let result = ConfigLoader::new().load();
        unsafe {
            env::remove_var("BULWARK_CIRCUIT_BREAKER__FAILURE_THRESHOLD");
            env::remove_var("BULWARK_RETRY__API__MAX_ATTEMPTS");
        }

        let config = result.unwrap();
        assert_eq!(config.circuit_breaker.failure_threshold, 7);
        let api = config.retry_policy("api").unwrap();
        assert_eq!(api.max_attempts, 6);
        assert_eq!(api.max_delay, Duration::from_secs(30));
    }

    #[test]
    #[serial]
    fn toml_file_merges_over_defaults() {
        let (_dir, path) = write_config(
            r#"
[logging]
level = "debug"
format = "json"

[retry.payments]
max_attempts = 4
strategy = "linear"
base_delay_ms = 250

[retry.api]
jitter = false

[alerts.rules.performance]
threshold = 2
"#,
        );
        let config = ConfigLoader::new().with_file(&path).load().unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);

        let payments = config.retry_policy("payments").unwrap();
        assert_eq!(payments.max_attempts, 4);
        assert_eq!(payments.strategy, RetryStrategy::LinearBackoff);
        assert_eq!(payments.base_delay, Duration::from_millis(250));
        assert_eq!(payments.max_delay, Duration::from_secs(60));

        let api = config.retry_policy("api").unwrap();
        assert!(!api.jitter);
        assert_eq!(api.max_attempts, 3);

        let rules = config.alert_rules().unwrap();
        let performance = rules.get(AlertCategory::Performance).unwrap();
        assert_eq!(performance.threshold, 2);
        assert_eq!(performance.window_minutes, 15);
    }

    #[test]
    #[serial]
    fn env_wins_over_file() {
        let (_dir, path) = write_config(
            r#"
[circuit_breaker]
failure_threshold = 3
recovery_timeout_ms = 1000
"#,
        );
        unsafe {
            env::set_var("BULWARK_CIRCUIT_BREAKER__FAILURE_THRESHOLD", "9");
        }
        let result = ConfigLoader::new().with_file(&path).load();
        unsafe {
            env::remove_var("BULWARK_CIRCUIT_BREAKER__FAILURE_THRESHOLD");
        }

        let breaker = result.unwrap().circuit_breaker_config().unwrap();
        assert_eq!(breaker.failure_threshold, 9);
        assert_eq!(breaker.recovery_timeout, Duration::from_secs(1));
    }

    #[test]
    #[serial]
    fn invalid_file_values_fail_validation() {
        let (_dir, path) = write_config(
            r#"
[retry.default]
max_attempts = 0
"#,
        );
        let err = ConfigLoader::new().with_file(&path).load().unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }), "{err}");

        let (_dir, path) = write_config(
            r#"
[alerts.rules.disk_space]
threshold = 1
"#,
        );
        let err = ConfigLoader::new().with_file(&path).load().unwrap_err();
        assert!(err.to_string().contains("alerts.rules.disk_space"), "{err}");
    }

    #[test]
    #[serial]
    fn explicit_file_without_toml_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resilience.conf");
        std::fs::write(&path, "[circuit_breaker]\nfailure_threshold = 2\n").unwrap();
        let config = ConfigLoader::new().with_file(&path).load().unwrap();
        assert_eq!(config.circuit_breaker.failure_threshold, 2);
    }

    #[test]
    fn missing_file_error() {
        let result = ConfigLoader::new()
            .with_file("/nonexistent/bulwark.toml")
            .load();
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }
}
