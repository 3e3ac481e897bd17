//! Backoff strategy implementations
//!
//! Delay before retry `attempt` (1-indexed, counting the attempt that just
//! failed):
//! - Exponential: `base * multiplier^(attempt-1)`
//! - Linear: `base * attempt`
//! - Fixed: `base`
//! - Custom: `custom_delays[attempt-1]`, clamped to the last entry
//!
//! Every strategy is capped at `max_delay` before jitter is applied.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::ConfigurationError;
use super::classifier::ErrorKind;

/// Lower bound of the jitter multiplier.
pub const JITTER_MIN: f64 = 0.5;
/// Upper bound of the jitter multiplier.
pub const JITTER_MAX: f64 = 1.5;

/// Rule for computing the wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    ExponentialBackoff,
    LinearBackoff,
    FixedInterval,
    Custom,
}

impl fmt::Display for RetryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RetryStrategy::ExponentialBackoff => "exponential_backoff",
            RetryStrategy::LinearBackoff => "linear_backoff",
            RetryStrategy::FixedInterval => "fixed_interval",
            RetryStrategy::Custom => "custom",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for RetryStrategy {
    type Err = String;

    /// Accepts the snake_case names plus the short forms `exponential`,
    /// `linear` and `fixed`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "exponential_backoff" | "exponential" => Ok(RetryStrategy::ExponentialBackoff),
            "linear_backoff" | "linear" => Ok(RetryStrategy::LinearBackoff),
            "fixed_interval" | "fixed" => Ok(RetryStrategy::FixedInterval),
            "custom" => Ok(RetryStrategy::Custom),
            _ => Err(format!("unknown retry strategy: {s}")),
        }
    }
}

/// Retry configuration, supplied per call-site.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub strategy: RetryStrategy,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Only used by [`RetryStrategy::ExponentialBackoff`], but validated
    /// for every strategy.
    pub backoff_multiplier: f64,
    pub jitter: bool,
    /// Delay sequence for [`RetryStrategy::Custom`].
    pub custom_delays: Vec<Duration>,
    /// Empty means "retry everything not denied".
    pub retryable_kinds: BTreeSet<ErrorKind>,
    pub non_retryable_kinds: BTreeSet<ErrorKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            strategy: RetryStrategy::ExponentialBackoff,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
            custom_delays: Vec::new(),
            retryable_kinds: BTreeSet::new(),
            non_retryable_kinds: BTreeSet::new(),
        }
    }
}

impl RetryConfig {
    /// External API calls: transport failures only.
    pub fn api() -> Self {
        Self {
            max_attempts: 3,
            strategy: RetryStrategy::ExponentialBackoff,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            retryable_kinds: BTreeSet::from([
                ErrorKind::Connection,
                ErrorKind::Timeout,
                ErrorKind::Retryable,
            ]),
            non_retryable_kinds: BTreeSet::from([
                ErrorKind::Validation,
                ErrorKind::Type,
                ErrorKind::NonRetryable,
            ]),
            ..Self::default()
        }
    }

    /// Database access: more attempts, shorter delays.
    pub fn database() -> Self {
        Self {
            max_attempts: 5,
            strategy: RetryStrategy::ExponentialBackoff,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            retryable_kinds: BTreeSet::from([ErrorKind::Connection, ErrorKind::Timeout]),
            ..Self::default()
        }
    }

    /// Workflow steps: one retry after a fixed pause.
    pub fn workflow() -> Self {
        Self {
            max_attempts: 2,
            strategy: RetryStrategy::FixedInterval,
            base_delay: Duration::from_secs(2),
            jitter: false,
            ..Self::default()
        }
    }

    /// Every strategy is held to the same multiplier and delay bounds so a
    /// config stays valid when only its strategy changes.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_attempts < 1 {
            return Err(ConfigurationError::InvalidMaxAttempts(self.max_attempts));
        }
        if self.strategy == RetryStrategy::Custom && self.custom_delays.is_empty() {
            return Err(ConfigurationError::EmptyCustomDelays);
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigurationError::InvalidMultiplier(
                self.backoff_multiplier.to_string(),
            ));
        }
        if self.base_delay > self.max_delay {
            return Err(ConfigurationError::BaseExceedsMax {
                base: self.base_delay,
                max: self.max_delay,
            });
        }
        Ok(())
    }
}

/// Source of the jitter multiplier applied when `jitter` is enabled.
pub trait JitterSource: Send + Sync + fmt::Debug {
    /// A factor in `[JITTER_MIN, JITTER_MAX]`.
    fn factor(&self) -> f64;
}

/// Samples a fresh uniform factor on every call. The default source.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomJitter;

impl JitterSource for RandomJitter {
    fn factor(&self) -> f64 {
        rand::rng().random_range(JITTER_MIN..=JITTER_MAX)
    }
}

/// Always returns the same factor (clamped into range).
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub f64);

impl JitterSource for FixedJitter {
    fn factor(&self) -> f64 {
        self.0.clamp(JITTER_MIN, JITTER_MAX)
    }
}

/// Delay before the attempt following `attempt`.
///
/// Fails only for a custom strategy with no delays; every other input yields
/// a delay.
pub fn delay(
    attempt: u32,
    config: &RetryConfig,
    jitter: &dyn JitterSource,
) -> Result<Duration, ConfigurationError> {
    let attempt = attempt.max(1);
    let raw = match config.strategy {
        RetryStrategy::ExponentialBackoff if config.base_delay.is_zero() => Duration::ZERO,
        RetryStrategy::ExponentialBackoff => {
            let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
            let secs = config.base_delay.as_secs_f64() * config.backoff_multiplier.powi(exponent);
            // Non-finite or out-of-range results are past any sane cap.
            Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
        }
        RetryStrategy::LinearBackoff => config.base_delay.saturating_mul(attempt),
        RetryStrategy::FixedInterval => config.base_delay,
        RetryStrategy::Custom => {
            let last = config
                .custom_delays
                .last()
                .ok_or(ConfigurationError::EmptyCustomDelays)?;
            let index = usize::try_from(attempt - 1).unwrap_or(usize::MAX);
            *config.custom_delays.get(index).unwrap_or(last)
        }
    };

    let capped = raw.min(config.max_delay);
    if !config.jitter {
        return Ok(capped);
    }
    let scaled = capped.as_secs_f64() * jitter.factor();
    Ok(Duration::try_from_secs_f64(scaled).unwrap_or(capped))
}
