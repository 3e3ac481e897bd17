//! Error classification for retry decisions
//!
//! Failures carry an [`ErrorKind`] discriminant; the retry decision is a
//! pure function of that kind and the allow/deny lists in [`RetryConfig`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::backoff::RetryConfig;

/// Kind of a failed operation, as seen by the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ErrorKind {
    /// Connection refused, reset, or dropped.
    Connection,
    Timeout,
    RateLimited,
    ServiceUnavailable,
    /// Explicitly marked as safe to retry.
    Retryable,
    /// Invalid input; retrying cannot help.
    Validation,
    /// Wrong type of value passed to the operation.
    Type,
    /// Missing field or member on a value.
    Attribute,
    /// Explicitly marked as never retryable.
    NonRetryable,
    /// Caller-defined kind.
    Other(String),
}

/// Kinds rejected when neither list in the config mentions the error.
const DEFAULT_NON_RETRYABLE: [ErrorKind; 4] = [
    ErrorKind::Validation,
    ErrorKind::Type,
    ErrorKind::Attribute,
    ErrorKind::NonRetryable,
];

impl ErrorKind {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::Retryable => "retryable",
            ErrorKind::Validation => "validation",
            ErrorKind::Type => "type",
            ErrorKind::Attribute => "attribute",
            ErrorKind::NonRetryable => "non_retryable",
            ErrorKind::Other(name) => name,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        let kind = match normalized.as_str() {
            "" => return Err("error kind must not be empty".to_string()),
            "connection" => ErrorKind::Connection,
            "timeout" => ErrorKind::Timeout,
            "rate_limited" => ErrorKind::RateLimited,
            "service_unavailable" => ErrorKind::ServiceUnavailable,
            "retryable" => ErrorKind::Retryable,
            "validation" => ErrorKind::Validation,
            "type" => ErrorKind::Type,
            "attribute" => ErrorKind::Attribute,
            "non_retryable" => ErrorKind::NonRetryable,
            _ => ErrorKind::Other(normalized),
        };
        Ok(kind)
    }
}

impl TryFrom<String> for ErrorKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ErrorKind> for String {
    fn from(kind: ErrorKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Trait for errors the retry executor can classify.
pub trait RetryClassifiable {
    fn error_kind(&self) -> ErrorKind;
}

impl RetryClassifiable for std::io::Error {
    fn error_kind(&self) -> ErrorKind {
        use std::io::ErrorKind as Io;
        match self.kind() {
            Io::ConnectionRefused
            | Io::ConnectionReset
            | Io::ConnectionAborted
            | Io::NotConnected
            | Io::BrokenPipe
            | Io::AddrNotAvailable => ErrorKind::Connection,
            Io::TimedOut | Io::WouldBlock => ErrorKind::Timeout,
            Io::Interrupted => ErrorKind::Retryable,
            Io::InvalidInput | Io::InvalidData => ErrorKind::Validation,
            Io::PermissionDenied | Io::Unsupported => ErrorKind::NonRetryable,
            other => ErrorKind::Other(format!("io_{other:?}").to_ascii_lowercase()),
        }
    }
}

/// Ready-made tagged failure for operations without their own error type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl RetryClassifiable for Failure {
    fn error_kind(&self) -> ErrorKind {
        self.kind.clone()
    }
}

/// Decide whether a failure of `kind` should be retried under `config`.
///
/// Evaluation order: the deny-list wins, then a non-empty allow-list is
/// exclusive, then the default deny-list applies.
pub fn is_retryable(kind: &ErrorKind, config: &RetryConfig) -> bool {
    if config.non_retryable_kinds.contains(kind) {
        return false;
    }
    if !config.retryable_kinds.is_empty() {
        return config.retryable_kinds.contains(kind);
    }
    !DEFAULT_NON_RETRYABLE.contains(kind)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn config(retryable: &[ErrorKind], non_retryable: &[ErrorKind]) -> RetryConfig {
        RetryConfig {
            retryable_kinds: retryable.iter().cloned().collect::<BTreeSet<_>>(),
            non_retryable_kinds: non_retryable.iter().cloned().collect::<BTreeSet<_>>(),
            ..RetryConfig::default()
        }
    }

    #[test]
    fn default_deny_list_applies_without_explicit_lists() {
        let cfg = config(&[], &[]);
        assert!(is_retryable(&ErrorKind::Connection, &cfg));
        assert!(is_retryable(&ErrorKind::Other("flaky".into()), &cfg));
        assert!(!is_retryable(&ErrorKind::Validation, &cfg));
        assert!(!is_retryable(&ErrorKind::Type, &cfg));
        assert!(!is_retryable(&ErrorKind::Attribute, &cfg));
        assert!(!is_retryable(&ErrorKind::NonRetryable, &cfg));
    }

    #[test]
    fn allow_list_is_exclusive() {
        let cfg = config(&[ErrorKind::Timeout], &[]);
        assert!(is_retryable(&ErrorKind::Timeout, &cfg));
        assert!(!is_retryable(&ErrorKind::Connection, &cfg));
    }

    #[test]
    fn allow_list_overrides_default_deny_list() {
        let cfg = config(&[ErrorKind::Validation], &[]);
        assert!(is_retryable(&ErrorKind::Validation, &cfg));
    }

    #[test]
    fn deny_entry_wins_over_allow_entry() {
        let cfg = config(&[ErrorKind::Timeout], &[ErrorKind::Timeout]);
        assert!(!is_retryable(&ErrorKind::Timeout, &cfg));
    }

    #[test]
    fn kinds_parse_and_print_snake_case() {
        assert_eq!(
            "rate-limited".parse::<ErrorKind>(),
            Ok(ErrorKind::RateLimited)
        );
        assert_eq!(
            "Service_Unavailable".parse::<ErrorKind>(),
            Ok(ErrorKind::ServiceUnavailable)
        );
        assert_eq!(
            "quota_exceeded".parse::<ErrorKind>(),
            Ok(ErrorKind::Other("quota_exceeded".into()))
        );
        assert!("  ".parse::<ErrorKind>().is_err());
        assert_eq!(ErrorKind::NonRetryable.to_string(), "non_retryable");
    }

    #[test]
    fn kinds_serialize_as_strings() {
        let json = serde_json::to_string(&vec![ErrorKind::Timeout, ErrorKind::Other("x".into())])
            .unwrap();
        assert_eq!(json, r#"["timeout","x"]"#);
        let back: Vec<ErrorKind> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![ErrorKind::Timeout, ErrorKind::Other("x".into())]);
    }

    #[test]
    fn io_errors_map_to_kinds() {
        use std::io;
        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(refused.error_kind(), ErrorKind::Connection);
        let timeout = io::Error::new(io::ErrorKind::TimedOut, "slow");
        assert_eq!(timeout.error_kind(), ErrorKind::Timeout);
        let bad = io::Error::new(io::ErrorKind::InvalidInput, "bad");
        assert_eq!(bad.error_kind(), ErrorKind::Validation);
    }

    #[test]
    fn failure_displays_kind_and_message() {
        let failure = Failure::new(ErrorKind::Timeout, "upstream took 30s");
        assert_eq!(failure.to_string(), "timeout: upstream took 30s");
        assert_eq!(failure.error_kind(), ErrorKind::Timeout);
    }
}
