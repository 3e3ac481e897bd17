//! Retry logic with backoff and circuit breaking
//!
//! This module provides:
//! - Backoff calculation (exponential, linear, fixed, custom sequences)
//! - Error classification (retryable vs non-retryable kinds)
//! - A per-operation circuit breaker with lazy half-open transition
//! - Blocking, async, and cancellable retry loops sharing one decision algorithm

pub mod backoff;
pub mod circuit_breaker;
pub mod classifier;
pub mod executor;

pub use backoff::{FixedJitter, JitterSource, RandomJitter, RetryConfig, RetryStrategy};
pub use circuit_breaker::{BreakerStats, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use classifier::{ErrorKind, Failure, RetryClassifiable, is_retryable};
pub use executor::{
    RetryExecutor, RetryStatus, StatusCallback, execute_with_retry, execute_with_retry_blocking,
};

/// Invalid retry or breaker parameters, reported before any attempt runs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("max_attempts must be at least 1, got {0}")]
    InvalidMaxAttempts(u32),

    #[error("custom backoff strategy requires at least one delay")]
    EmptyCustomDelays,

    #[error("backoff multiplier must be a finite value >= 1.0, got {0}")]
    InvalidMultiplier(String),

    #[error("base delay {base:?} exceeds max delay {max:?}")]
    BaseExceedsMax {
        base: std::time::Duration,
        max: std::time::Duration,
    },

    #[error("failure_threshold must be at least 1, got {0}")]
    InvalidFailureThreshold(u32),

    #[error("alert threshold for {category} must be at least 1, got {threshold}")]
    InvalidAlertThreshold { category: String, threshold: u32 },
}

/// Final outcome of a retried call that did not succeed.
///
/// Intermediate attempt failures are only logged; callers see exactly one of
/// these.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// The classifier rejected a retry; the operation's error, unchanged.
    #[error("{0}")]
    NonRetryable(E),

    /// The breaker denied admission.
    #[error("circuit breaker open after {attempts_made} attempts")]
    CircuitOpen {
        attempts_made: u32,
        last_error: Option<E>,
    },

    /// Every attempt failed with a retryable error.
    #[error("operation failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: E },

    /// External cancellation (cancellable variant only).
    #[error("retry aborted by cancellation after {attempts_made} attempts")]
    Aborted {
        attempts_made: u32,
        last_error: Option<E>,
    },

    #[error("invalid retry configuration: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl<E> RetryError<E> {
    /// The most recent operation error, if one was observed.
    pub fn last_error(&self) -> Option<&E> {
        match self {
            RetryError::NonRetryable(err) => Some(err),
            RetryError::Exhausted { last_error, .. } => Some(last_error),
            RetryError::CircuitOpen { last_error, .. } | RetryError::Aborted { last_error, .. } => {
                last_error.as_ref()
            }
            RetryError::Configuration(_) => None,
        }
    }

    /// Consume the outcome, returning the most recent operation error.
    pub fn into_last_error(self) -> Option<E> {
        match self {
            RetryError::NonRetryable(err) => Some(err),
            RetryError::Exhausted { last_error, .. } => Some(last_error),
            RetryError::CircuitOpen { last_error, .. } | RetryError::Aborted { last_error, .. } => {
                last_error
            }
            RetryError::Configuration(_) => None,
        }
    }

    /// Number of operation invocations that happened before this outcome.
    pub fn attempts_made(&self) -> Option<u32> {
        match self {
            RetryError::Exhausted { attempts, .. } => Some(*attempts),
            RetryError::CircuitOpen { attempts_made, .. }
            | RetryError::Aborted { attempts_made, .. } => Some(*attempts_made),
            RetryError::NonRetryable(_) | RetryError::Configuration(_) => None,
        }
    }
}
