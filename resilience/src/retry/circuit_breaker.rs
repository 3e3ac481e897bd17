//! Circuit breaker for cascading failure prevention
//!
//! One breaker guards one dependency. State moves Closed -> Open once
//! consecutive failures reach the threshold. Open -> HalfOpen happens lazily
//! inside [`CircuitBreaker::admit`] once the recovery timeout has elapsed
//! since the last failure; there is no background timer. HalfOpen admits
//! calls like Closed: a success closes the circuit, a failure re-opens it and
//! restarts the recovery clock.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::ConfigurationError;
use crate::clock::{Clock, SystemClock, to_delta};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls admitted, failures tracked.
    Closed,
    /// Calls rejected until the recovery timeout elapses.
    Open,
    /// Probing recovery; calls admitted.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.failure_threshold < 1 {
            return Err(ConfigurationError::InvalidFailureThreshold(
                self.failure_threshold,
            ));
        }
        Ok(())
    }
}

/// Counters accumulated over the breaker's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerStats {
    pub total_attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub last_success_time: Option<DateTime<Utc>>,
    pub last_failure_time: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_time: Option<DateTime<Utc>>,
    stats: BreakerStats,
}

/// Per-operation circuit breaker.
///
/// All operations on one instance are serialized through an internal mutex,
/// so a breaker can be shared (e.g. behind an `Arc`) by concurrent callers.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<BreakerInner>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
    ) -> Result<Self, ConfigurationError> {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            config,
            clock,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure_time: None,
                stats: BreakerStats::default(),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a call may proceed now.
    ///
    /// Returns false only while Open with the recovery timeout not yet
    /// elapsed. When it has elapsed, this call moves the breaker to HalfOpen.
    pub fn admit(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != CircuitState::Open {
            return true;
        }

        let now = self.clock.now();
        let recovered = inner
            .last_failure_time
            .is_none_or(|failed_at| now - failed_at >= to_delta(self.config.recovery_timeout));
        if !recovered {
            return false;
        }

        inner.state = CircuitState::HalfOpen;
        info!(
            breaker = %self.name,
            consecutive_failures = inner.consecutive_failures,
            "circuit half-opened"
        );
        true
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        let now = self.clock.now();
        let previous = inner.state;

        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.stats.total_attempts += 1;
        inner.stats.successes += 1;
        inner.stats.last_success_time = Some(now);

        if previous != CircuitState::Closed {
            info!(breaker = %self.name, from = %previous, "circuit closed");
        }
        debug!(breaker = %self.name, "circuit breaker success recorded");
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        let now = self.clock.now();

        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure_time = Some(now);
        inner.stats.total_attempts += 1;
        inner.stats.failures += 1;
        inner.stats.last_failure_time = Some(now);

        if inner.consecutive_failures >= self.config.failure_threshold {
            let reopened = inner.state == CircuitState::HalfOpen;
            if inner.state != CircuitState::Open {
                warn!(
                    breaker = %self.name,
                    consecutive_failures = inner.consecutive_failures,
                    threshold = self.config.failure_threshold,
                    reopened,
                    "circuit opened"
                );
            }
            inner.state = CircuitState::Open;
        }
        debug!(
            breaker = %self.name,
            consecutive_failures = inner.consecutive_failures,
            state = %inner.state,
            "circuit breaker failure recorded"
        );
    }

    /// Current state, without evaluating the recovery timeout.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn last_failure_time(&self) -> Option<DateTime<Utc>> {
        self.lock().last_failure_time
    }

    pub fn stats(&self) -> BreakerStats {
        self.lock().stats.clone()
    }

    /// Force the breaker back to Closed, keeping its stats.
    pub fn reset(&self) {
        let mut inner = self.lock();
        let previous = inner.state;
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.last_failure_time = None;
        info!(breaker = %self.name, from = %previous, forced = true, "circuit closed");
    }
}
