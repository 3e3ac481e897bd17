//! Deduplicated, thresholded and suppressed alerting.
//!
//! - [`AlertRuleTable`]: category -> rule configuration
//! - [`AlertManager`]: the stateful registry
//! - [`NotificationChannel`]: pluggable delivery, [`LogChannel`] by default
//! - [`builders`]: argument-shaping wrappers for common scenarios

pub mod builders;
pub mod manager;
pub mod notifier;
pub mod rules;
pub mod types;

pub use builders::{
    ApiOutage, AuthenticationFailure, ResourceThreshold, SecurityIssue, WorkflowFailure,
};
pub use manager::AlertManager;
pub use notifier::{LogChannel, Notification, NotificationChannel, NotificationKind, NotifyError};
pub use rules::{AlertRule, AlertRuleTable};
pub use types::{Alert, AlertCategory, AlertSeverity, AlertStatus, AlertSummary, Metadata};
