//! Retry executor
//!
//! Runs a caller-supplied operation up to `max_attempts` times. The blocking,
//! async, and cancellable variants drive the same [`AttemptLoop`]; they only
//! differ in how the inter-attempt delay is realized.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backoff::{self, JitterSource, RandomJitter, RetryConfig};
use super::circuit_breaker::CircuitBreaker;
use super::classifier::{ErrorKind, RetryClassifiable, is_retryable};
use super::{ConfigurationError, RetryError};

const DEFAULT_OPERATION_NAME: &str = "operation";

/// Progress report delivered right before each inter-attempt delay.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryStatus {
    pub operation: String,
    /// The attempt that just failed (1-indexed).
    pub attempt: u32,
    pub max_attempts: u32,
    /// Delay before the next attempt.
    pub delay: Duration,
    pub error_kind: ErrorKind,
    /// Time since the first attempt started.
    pub elapsed: Duration,
}

pub type StatusCallback = Arc<dyn Fn(&RetryStatus) + Send + Sync>;

/// Executor object holding one validated [`RetryConfig`].
///
/// # Example
/// ```no_run
/// use bulwark_resilience::retry::{ErrorKind, Failure, RetryConfig, RetryExecutor};
///
/// # async fn fetch() -> Result<String, Failure> { Err(Failure::new(ErrorKind::Timeout, "slow")) }
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let executor = RetryExecutor::new(RetryConfig::api())?.named("github.fetch_repo");
/// let body = executor.execute(fetch, None).await?;
/// # let _ = body;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
    operation: String,
    jitter: Arc<dyn JitterSource>,
    on_retry: Option<StatusCallback>,
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("config", &self.config)
            .field("operation", &self.operation)
            .field("jitter", &self.jitter)
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl RetryExecutor {
    /// Validate `config` and build an executor. Invalid configurations fail
    /// here, never mid-retry.
    pub fn new(config: RetryConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self {
            config,
            operation: DEFAULT_OPERATION_NAME.to_string(),
            jitter: Arc::new(RandomJitter),
            on_retry: None,
        })
    }

    /// Name used in log events.
    pub fn named(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }

    pub fn with_jitter_source(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_status_callback(mut self, callback: StatusCallback) -> Self {
        self.on_retry = Some(callback);
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Blocking variant: the calling thread sleeps between attempts.
    pub fn execute_blocking<T, E, F>(
        &self,
        mut operation: F,
        breaker: Option<&CircuitBreaker>,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        E: RetryClassifiable + fmt::Display,
    {
        let mut attempts = AttemptLoop::new(self, breaker);
        loop {
            let attempt = attempts.begin()?;
            let outcome = operation();
            match attempts.settle(attempt, outcome) {
                Step::Done(result) => return result,
                Step::Wait(delay) => std::thread::sleep(delay),
            }
        }
    }

    /// Async variant: yields to the scheduler between attempts.
    pub async fn execute<T, E, F, Fut>(
        &self,
        mut operation: F,
        breaker: Option<&CircuitBreaker>,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryClassifiable + fmt::Display,
    {
        let mut attempts = AttemptLoop::new(self, breaker);
        loop {
            let attempt = attempts.begin()?;
            let outcome = operation().await;
            match attempts.settle(attempt, outcome) {
                Step::Done(result) => return result,
                Step::Wait(delay) => tokio::time::sleep(delay).await,
            }
        }
    }

    /// Async variant that stops when `cancel` fires.
    ///
    /// The token is checked before every attempt and raced against every
    /// delay. An in-flight attempt is not interrupted.
    pub async fn execute_cancellable<T, E, F, Fut>(
        &self,
        mut operation: F,
        breaker: Option<&CircuitBreaker>,
        cancel: &CancellationToken,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryClassifiable + fmt::Display,
    {
        let mut attempts = AttemptLoop::new(self, breaker);
        loop {
            if cancel.is_cancelled() {
                return Err(attempts.aborted());
            }
            let attempt = attempts.begin()?;
            let outcome = operation().await;
            match attempts.settle(attempt, outcome) {
                Step::Done(result) => return result,
                Step::Wait(delay) => {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(attempts.aborted()),
                    }
                }
            }
        }
    }
}

/// Build an executor for `config` and run `operation` once through it.
pub async fn execute_with_retry<T, E, F, Fut>(
    operation: F,
    config: RetryConfig,
    breaker: Option<&CircuitBreaker>,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryClassifiable + fmt::Display,
{
    let executor = RetryExecutor::new(config)?;
    executor.execute(operation, breaker).await
}

/// Blocking counterpart of [`execute_with_retry`].
pub fn execute_with_retry_blocking<T, E, F>(
    operation: F,
    config: RetryConfig,
    breaker: Option<&CircuitBreaker>,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Result<T, E>,
    E: RetryClassifiable + fmt::Display,
{
    let executor = RetryExecutor::new(config)?;
    executor.execute_blocking(operation, breaker)
}

/// What the driver should do after an attempt settles.
enum Step<T, E> {
    Done(Result<T, RetryError<E>>),
    Wait(Duration),
}

/// Decision state for one retried call.
struct AttemptLoop<'a, E> {
    executor: &'a RetryExecutor,
    breaker: Option<&'a CircuitBreaker>,
    started: Instant,
    attempts_made: u32,
    last_error: Option<E>,
}

impl<'a, E> AttemptLoop<'a, E>
where
    E: RetryClassifiable + fmt::Display,
{
    fn new(executor: &'a RetryExecutor, breaker: Option<&'a CircuitBreaker>) -> Self {
        Self {
            executor,
            breaker,
            started: Instant::now(),
            attempts_made: 0,
            last_error: None,
        }
    }

    /// Ask the breaker for admission and return the number of the attempt
    /// about to run.
    fn begin(&mut self) -> Result<u32, RetryError<E>> {
        let attempt = self.attempts_made + 1;
        if let Some(breaker) = self.breaker
            && !breaker.admit()
        {
            warn!(
                operation = %self.executor.operation,
                breaker = %breaker.name(),
                attempts_made = self.attempts_made,
                "circuit open, call rejected"
            );
            return Err(RetryError::CircuitOpen {
                attempts_made: self.attempts_made,
                last_error: self.last_error.take(),
            });
        }
        self.attempts_made = attempt;
        Ok(attempt)
    }

    fn settle<T>(&mut self, attempt: u32, outcome: Result<T, E>) -> Step<T, E> {
        let config = &self.executor.config;
        let operation = self.executor.operation.as_str();

        let err = match outcome {
            Ok(value) => {
                if let Some(breaker) = self.breaker {
                    breaker.record_success();
                }
                if attempt > 1 {
                    info!(
                        operation,
                        attempt,
                        elapsed_ms = self.started.elapsed().as_millis() as u64,
                        "operation recovered after retry"
                    );
                } else {
                    debug!(operation, attempt, "attempt succeeded");
                }
                return Step::Done(Ok(value));
            }
            Err(err) => err,
        };

        if let Some(breaker) = self.breaker {
            breaker.record_failure();
        }

        let kind = err.error_kind();
        if !is_retryable(&kind, config) {
            warn!(
                operation,
                attempt,
                error_kind = %kind,
                error = %err,
                "non-retryable failure"
            );
            return Step::Done(Err(RetryError::NonRetryable(err)));
        }

        if attempt >= config.max_attempts {
            error!(
                operation,
                max_attempts = config.max_attempts,
                elapsed_ms = self.started.elapsed().as_millis() as u64,
                error_kind = %kind,
                error = %err,
                "retry attempts exhausted"
            );
            return Step::Done(Err(RetryError::Exhausted {
                attempts: attempt,
                last_error: err,
            }));
        }

        let delay = match backoff::delay(attempt, config, self.executor.jitter.as_ref()) {
            Ok(delay) => delay,
            Err(config_err) => return Step::Done(Err(RetryError::Configuration(config_err))),
        };

        warn!(
            operation,
            attempt,
            max_attempts = config.max_attempts,
            error_kind = %kind,
            error = %err,
            delay_ms = delay.as_millis() as u64,
            "attempt failed, retrying"
        );

        if let Some(callback) = &self.executor.on_retry {
            callback(&RetryStatus {
                operation: operation.to_string(),
                attempt,
                max_attempts: config.max_attempts,
                delay,
                error_kind: kind,
                elapsed: self.started.elapsed(),
            });
        }

        self.last_error = Some(err);
        Step::Wait(delay)
    }

    fn aborted(&mut self) -> RetryError<E> {
        info!(
            operation = %self.executor.operation,
            attempts_made = self.attempts_made,
            "retry cancelled"
        );
        RetryError::Aborted {
            attempts_made: self.attempts_made,
            last_error: self.last_error.take(),
        }
    }
}
