//! Layered configuration
//!
//! Configuration is loaded from (highest priority wins):
//! 1. Environment variables (`BULWARK_*`)
//! 2. A TOML file (`--config`, `./bulwark.toml`, XDG, or `~/.bulwark.toml`)
//! 3. Defaults built from the library presets
//!
//! The file schema uses milliseconds and plain strings; [`ResilienceConfig`]
//! converts it into the typed [`RetryConfig`], [`CircuitBreakerConfig`] and
//! [`AlertRuleTable`] values, rejecting anything invalid.

pub mod error;
pub mod loader;

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::alerts::{AlertCategory, AlertRule, AlertRuleTable, AlertSeverity};
use crate::retry::{
    CircuitBreakerConfig, ConfigurationError, ErrorKind, RetryConfig, RetryStrategy,
};

pub use bulwark_telemetry::{LogFormat, LoggingOptions};
pub use error::{ConfigError, Result};
pub use loader::ConfigLoader;

/// Policy used when a caller does not name one.
pub const DEFAULT_POLICY: &str = "default";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResilienceConfig {
    #[serde(default)]
    pub logging: LoggingOptions,

    /// Named retry policies.
    #[serde(default = "default_retry_policies")]
    pub retry: BTreeMap<String, RetryPolicyConfig>,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,

    #[serde(default)]
    pub alerts: AlertsConfig,
}

/// One retry policy as written in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicyConfig {
    pub max_attempts: u32,
    pub strategy: String,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
    pub custom_delays_ms: Vec<u64>,
    pub retryable_kinds: Vec<String>,
    pub non_retryable_kinds: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_recovery_timeout_ms")]
    pub recovery_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// Per-category overrides, merged over the built-in rule table.
    #[serde(default = "default_alert_rules")]
    pub rules: BTreeMap<String, AlertRuleOverride>,
}

/// Partial alert rule; unset fields keep the built-in value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRuleOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppress_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

fn default_failure_threshold() -> u32 {
    CircuitBreakerConfig::default().failure_threshold
}
fn default_recovery_timeout_ms() -> u64 {
    duration_ms(CircuitBreakerConfig::default().recovery_timeout)
}

fn default_retry_policies() -> BTreeMap<String, RetryPolicyConfig> {
    [
        (DEFAULT_POLICY, RetryConfig::default()),
        ("api", RetryConfig::api()),
        ("database", RetryConfig::database()),
        ("workflow", RetryConfig::workflow()),
    ]
    .into_iter()
    .map(|(name, preset)| (name.to_string(), RetryPolicyConfig::from(&preset)))
    .collect()
}

fn default_alert_rules() -> BTreeMap<String, AlertRuleOverride> {
    AlertRuleTable::default()
        .iter()
        .map(|rule| (rule.category.to_string(), AlertRuleOverride::from(rule)))
        .collect()
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_ms: default_recovery_timeout_ms(),
        }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            rules: default_alert_rules(),
        }
    }
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            logging: LoggingOptions::default(),
            retry: default_retry_policies(),
            circuit_breaker: CircuitBreakerSettings::default(),
            alerts: AlertsConfig::default(),
        }
    }
}

impl From<&RetryConfig> for RetryPolicyConfig {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            strategy: config.strategy.to_string(),
            base_delay_ms: duration_ms(config.base_delay),
            max_delay_ms: duration_ms(config.max_delay),
            backoff_multiplier: config.backoff_multiplier,
            jitter: config.jitter,
            custom_delays_ms: config.custom_delays.iter().copied().map(duration_ms).collect(),
            retryable_kinds: config.retryable_kinds.iter().map(ToString::to_string).collect(),
            non_retryable_kinds: config
                .non_retryable_kinds
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl From<&AlertRule> for AlertRuleOverride {
    fn from(rule: &AlertRule) -> Self {
        Self {
            severity: Some(rule.default_severity.to_string()),
            threshold: Some(rule.threshold),
            window_minutes: Some(rule.window_minutes),
            suppress_minutes: Some(rule.suppress_minutes),
            enabled: Some(rule.enabled),
        }
    }
}

fn parse_kinds(path: &str, names: &[String]) -> Result<BTreeSet<ErrorKind>> {
    names
        .iter()
        .map(|name| {
            name.parse::<ErrorKind>()
                .map_err(|err| ConfigError::invalid(path, err))
        })
        .collect()
}

impl RetryPolicyConfig {
    /// Convert into a validated [`RetryConfig`]. `name` is only used in
    /// error paths.
    pub fn to_retry_config(&self, name: &str) -> Result<RetryConfig> {
        let path = |field: &str| format!("retry.{name}.{field}");
        let strategy = self
            .strategy
            .parse::<RetryStrategy>()
            .map_err(|err| ConfigError::invalid(path("strategy"), err))?;

        let config = RetryConfig {
            max_attempts: self.max_attempts,
            strategy,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
            jitter: self.jitter,
            custom_delays: self
                .custom_delays_ms
                .iter()
                .copied()
                .map(Duration::from_millis)
                .collect(),
            retryable_kinds: parse_kinds(&path("retryable_kinds"), &self.retryable_kinds)?,
            non_retryable_kinds: parse_kinds(
                &path("non_retryable_kinds"),
                &self.non_retryable_kinds,
            )?,
        };
        config.validate().map_err(|err| {
            let field = match err {
                ConfigurationError::InvalidMaxAttempts(_) => Some("max_attempts"),
                ConfigurationError::EmptyCustomDelays => Some("custom_delays_ms"),
                ConfigurationError::InvalidMultiplier(_) => Some("backoff_multiplier"),
                ConfigurationError::BaseExceedsMax { .. } => Some("base_delay_ms"),
                _ => None,
            };
            match field {
                Some(field) => ConfigError::invalid(path(field), err),
                None => ConfigError::invalid(format!("retry.{name}"), err),
            }
        })?;
        Ok(config)
    }
}

impl ResilienceConfig {
    /// Typed retry configuration for the named policy.
    pub fn retry_policy(&self, name: &str) -> Result<RetryConfig> {
        self.retry
            .get(name)
            .ok_or_else(|| ConfigError::UnknownPolicy(name.to_string()))?
            .to_retry_config(name)
    }

    pub fn policy_names(&self) -> impl Iterator<Item = &str> {
        self.retry.keys().map(String::as_str)
    }

    pub fn circuit_breaker_config(&self) -> Result<CircuitBreakerConfig> {
        let config = CircuitBreakerConfig {
            failure_threshold: self.circuit_breaker.failure_threshold,
            recovery_timeout: Duration::from_millis(self.circuit_breaker.recovery_timeout_ms),
        };
        config
            .validate()
            .map_err(|err| ConfigError::invalid("circuit_breaker.failure_threshold", err))?;
        Ok(config)
    }

    /// Built-in rule table with the configured overrides applied.
    pub fn alert_rules(&self) -> Result<AlertRuleTable> {
        let mut table = AlertRuleTable::default();
        for (name, patch) in &self.alerts.rules {
            let path = format!("alerts.rules.{name}");
            let category = name
                .parse::<AlertCategory>()
                .map_err(|err| ConfigError::invalid(&path, err))?;
            let mut rule = AlertRule::default_for(category);
            if let Some(severity) = &patch.severity {
                rule.default_severity = severity
                    .parse::<AlertSeverity>()
                    .map_err(|err| ConfigError::invalid(format!("{path}.severity"), err))?;
            }
            if let Some(threshold) = patch.threshold {
                rule.threshold = threshold;
            }
            if let Some(window) = patch.window_minutes {
                rule.window_minutes = window;
            }
            if let Some(suppress) = patch.suppress_minutes {
                rule.suppress_minutes = suppress;
            }
            if let Some(enabled) = patch.enabled {
                rule.enabled = enabled;
            }
            table
                .insert(rule)
                .map_err(|err| ConfigError::invalid(format!("{path}.threshold"), err))?;
        }
        Ok(table)
    }

    /// Check every section, reporting the first invalid value.
    pub fn validate(&self) -> Result<()> {
        for name in self.retry.keys() {
            self.retry_policy(name)?;
        }
        self.circuit_breaker_config()?;
        self.alert_rules()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_round_trip_to_presets() {
        let config = ResilienceConfig::default();
        assert_eq!(config.retry_policy("api").unwrap(), RetryConfig::api());
        assert_eq!(config.retry_policy("database").unwrap(), RetryConfig::database());
        assert_eq!(config.retry_policy("workflow").unwrap(), RetryConfig::workflow());
        assert_eq!(
            config.retry_policy(DEFAULT_POLICY).unwrap(),
            RetryConfig::default()
        );
        assert_eq!(
            config.circuit_breaker_config().unwrap(),
            CircuitBreakerConfig::default()
        );
        assert_eq!(config.alert_rules().unwrap(), AlertRuleTable::default());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        config.validate().unwrap();
    }

    #[test]
    fn unknown_policy_is_reported() {
        let config = ResilienceConfig::default();
        assert!(matches!(
            config.retry_policy("payments"),
            Err(ConfigError::UnknownPolicy(name)) if name == "payments"
        ));
    }

    #[test]
    fn alert_override_keeps_unset_fields() {
        let mut config = ResilienceConfig::default();
        config.alerts.rules.insert(
            "performance".into(),
            AlertRuleOverride {
                threshold: Some(2),
                enabled: Some(false),
                ..AlertRuleOverride::default()
            },
        );
        let rule = *config
            .alert_rules()
            .unwrap()
            .get(AlertCategory::Performance)
            .unwrap();
        assert_eq!(rule.threshold, 2);
        assert!(!rule.enabled);
        assert_eq!(rule.window_minutes, 15);
        assert_eq!(rule.default_severity, AlertSeverity::Low);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = ResilienceConfig::default();
        config.alerts.rules.insert("disk".into(), AlertRuleOverride::default());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError { path, .. }) if path == "alerts.rules.disk"
        ));

        let mut config = ResilienceConfig::default();
        if let Some(policy) = config.retry.get_mut("api") {
            policy.strategy = "random".into();
        }
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError { path, .. }) if path == "retry.api.strategy"
        ));

        let mut config = ResilienceConfig::default();
        if let Some(policy) = config.retry.get_mut("workflow") {
            policy.backoff_multiplier = 0.5;
        }
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError { path, .. }) if path == "retry.workflow.backoff_multiplier"
        ));

        let mut config = ResilienceConfig::default();
        if let Some(policy) = config.retry.get_mut("workflow") {
            policy.strategy = "custom".into();
            policy.custom_delays_ms = vec![100];
            policy.base_delay_ms = 5_000;
            policy.max_delay_ms = 1_000;
        }
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError { path, .. }) if path == "retry.workflow.base_delay_ms"
        ));

        let mut config = ResilienceConfig::default();
        if let Some(policy) = config.retry.get_mut("database") {
            policy.base_delay_ms = 20_000;
        }
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError { path, .. }) if path == "retry.database.base_delay_ms"
        ));

        let mut config = ResilienceConfig::default();
        config.circuit_breaker.failure_threshold = 0;
        assert!(config.validate().is_err());

        let mut config = ResilienceConfig::default();
        config.alerts.rules.insert(
            "security".into(),
            AlertRuleOverride {
                severity: Some("urgent".into()),
                ..AlertRuleOverride::default()
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn custom_policy_requires_delays() {
        let policy = RetryPolicyConfig {
            strategy: "custom".into(),
            custom_delays_ms: Vec::new(),
            ..RetryPolicyConfig::default()
        };
        assert!(policy.to_retry_config("batch").is_err());

        let policy = RetryPolicyConfig {
            strategy: "custom".into(),
            custom_delays_ms: vec![100, 500, 2_000],
            ..RetryPolicyConfig::default()
        };
        let config = policy.to_retry_config("batch").unwrap();
        assert_eq!(config.custom_delays.len(), 3);
        assert_eq!(config.custom_delays[2], Duration::from_secs(2));
    }

    #[test]
    fn unknown_kind_names_become_other() {
        let policy = RetryPolicyConfig {
            retryable_kinds: vec!["quota_exceeded".into()],
            ..RetryPolicyConfig::default()
        };
        let config = policy.to_retry_config("x").unwrap();
        assert!(
            config
                .retryable_kinds
                .contains(&ErrorKind::Other("quota_exceeded".into()))
        );

        let policy = RetryPolicyConfig {
            non_retryable_kinds: vec!["  ".into()],
            ..RetryPolicyConfig::default()
        };
        assert!(policy.to_retry_config("x").is_err());
    }
}
