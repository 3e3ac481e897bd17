use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use bulwark_resilience::config::{DEFAULT_POLICY, ResilienceConfig};
use bulwark_resilience::retry::{
    CircuitBreaker, ErrorKind, Failure, RetryError, RetryExecutor, RetryStatus,
};
use clap::Parser;

#[derive(Debug, Parser)]
pub struct RetryArgs {
    /// Retry policy name from the configuration
    #[arg(long, default_value = DEFAULT_POLICY)]
    pub policy: String,

    /// Number of failures before the operation succeeds
    #[arg(long, value_name = "N", default_value_t = 2)]
    pub failures: u32,

    /// Error kind reported by each failure (e.g. timeout, validation)
    #[arg(long, default_value = "timeout")]
    pub kind: ErrorKind,

    /// Route attempts through a circuit breaker built from the configuration
    #[arg(long)]
    pub breaker: bool,
}

/// Operation that fails a fixed number of times, then succeeds.
#[derive(Debug)]
struct FlakyOperation {
    failures: u32,
    kind: ErrorKind,
    calls: AtomicU32,
}

impl FlakyOperation {
    fn new(failures: u32, kind: ErrorKind) -> Self {
        Self {
            failures,
            kind,
            calls: AtomicU32::new(0),
        }
    }

    async fn call(&self) -> Result<u32, Failure> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Err(Failure::new(
                self.kind.clone(),
                format!("simulated failure {call} of {}", self.failures),
            ));
        }
        Ok(call)
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

fn describe(outcome: &Result<u32, RetryError<Failure>>) -> String {
    match outcome {
        Ok(attempt) => format!("succeeded on attempt {attempt}"),
        Err(RetryError::NonRetryable(err)) => format!("gave up, not retryable: {err}"),
        Err(err) => format!("failed: {err}"),
    }
}

pub async fn run(config: &ResilienceConfig, args: RetryArgs) -> anyhow::Result<ExitCode> {
    let retry_config = config.retry_policy(&args.policy)?;
    let breaker = if args.breaker {
        Some(CircuitBreaker::new(
            "simulated",
            config.circuit_breaker_config()?,
        )?)
    } else {
        None
    };

    let executor = RetryExecutor::new(retry_config)?
        .named(format!("simulated.{}", args.policy))
        .with_status_callback(Arc::new(|status: &RetryStatus| {
            println!(
                "attempt {}/{} failed ({}), retrying in {:?}",
                status.attempt, status.max_attempts, status.error_kind, status.delay
            );
        }));

    tracing::info!(
        policy = %args.policy,
        failures = args.failures,
        kind = %args.kind,
        breaker = args.breaker,
        "starting simulated retry run"
    );
    let operation = FlakyOperation::new(args.failures, args.kind);
    let outcome = executor.execute(|| operation.call(), breaker.as_ref()).await;

    println!("{} ({} calls)", describe(&outcome), operation.calls());
    if let Some(breaker) = &breaker {
        println!(
            "breaker {}: {}",
            breaker.state(),
            serde_json::to_string(&breaker.stats())?
        );
    }

    Ok(if outcome.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn flaky_operation_fails_then_succeeds() {
        let operation = FlakyOperation::new(2, ErrorKind::Connection);
        assert!(operation.call().await.is_err());
        let second = operation.call().await.unwrap_err();
        assert_eq!(second.kind, ErrorKind::Connection);
        assert_eq!(second.message, "simulated failure 2 of 2");
        assert_eq!(operation.call().await.unwrap(), 3);
        assert_eq!(operation.calls(), 3);
    }

    #[test]
    fn outcomes_are_described() {
        assert_eq!(describe(&Ok(3)), "succeeded on attempt 3");
        let non_retryable = RetryError::NonRetryable(Failure::new(ErrorKind::Validation, "bad"));
        assert_eq!(
            describe(&Err(non_retryable)),
            "gave up, not retryable: validation: bad"
        );
        let exhausted = RetryError::Exhausted {
            attempts: 2,
            last_error: Failure::new(ErrorKind::Timeout, "slow"),
        };
        assert_eq!(
            describe(&Err(exhausted)),
            "failed: operation failed after 2 attempts: timeout: slow"
        );
    }

    #[test]
    fn args_parse_kind_names() {
        let args = RetryArgs::try_parse_from([
            "retry",
            "--policy",
            "api",
            "--failures",
            "4",
            "--kind",
            "rate-limited",
            "--breaker",
        ])
        .unwrap();
        assert_eq!(args.policy, "api");
        assert_eq!(args.failures, 4);
        assert_eq!(args.kind, ErrorKind::RateLimited);
        assert!(args.breaker);
    }
}
