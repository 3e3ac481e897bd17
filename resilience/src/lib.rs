//! Resilience and incident-signaling layer for services that call
//! unreliable dependencies.
//!
//! Two cooperating halves:
//!
//! - [`retry`]: backoff calculation, failure classification, a per-operation
//!   [`retry::CircuitBreaker`], and the [`retry::RetryExecutor`] that wraps a
//!   fallible operation in a blocking or async retry loop.
//! - [`alerts`]: the [`alerts::AlertManager`] that deduplicates, thresholds
//!   and suppresses failure signals and hands the resulting alerts to a
//!   pluggable [`alerts::NotificationChannel`].
//!
//! All state is in-process. Construct one [`alerts::AlertManager`] at startup
//! and pass it down; breakers are owned by the integration code that protects
//! a given dependency.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod alerts;
pub mod clock;
pub mod config;
pub mod retry;

pub use alerts::{
    Alert, AlertCategory, AlertManager, AlertRule, AlertRuleTable, AlertSeverity, AlertStatus,
    AlertSummary,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use retry::{
    CircuitBreaker, CircuitBreakerConfig, ConfigurationError, ErrorKind, Failure, RetryConfig,
    RetryError, RetryExecutor, RetryStrategy, execute_with_retry, execute_with_retry_blocking,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
