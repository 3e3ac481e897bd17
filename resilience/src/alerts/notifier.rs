//! Notification channels
//!
//! The manager hands every fired alert to one or more channels from a
//! detached task. Channel failures are logged by the dispatcher and never
//! reach the code that triggered the alert.

use async_trait::async_trait;
use serde::Serialize;
use tracing::error;

use super::types::{Alert, AlertSeverity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Sent for every fired alert.
    Standard,
    /// Extra page for critical alerts, sent after the standard one.
    Escalation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub alert: Alert,
}

impl Notification {
    /// Notifications owed for `alert`, in delivery order.
    pub fn for_alert(alert: &Alert) -> Vec<Notification> {
        let mut out = vec![Notification {
            kind: NotificationKind::Standard,
            alert: alert.clone(),
        }];
        if alert.severity == AlertSeverity::Critical {
            out.push(Notification {
                kind: NotificationKind::Escalation,
                alert: alert.clone(),
            });
        }
        out
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("channel {channel} rejected notification: {reason}")]
    Rejected { channel: String, reason: String },

    #[error("failed to encode alert metadata: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Destination for alert notifications.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Default channel: writes each notification as an error-level event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let alert = &notification.alert;
        let metadata = serde_json::to_string(&alert.metadata)?;
        match notification.kind {
            NotificationKind::Standard => error!(
                alert_id = %alert.id,
                title = %alert.title,
                description = %alert.description,
                severity = %alert.severity,
                category = %alert.category,
                count = alert.count,
                metadata = %metadata,
                "ALERT"
            ),
            NotificationKind::Escalation => error!(
                alert_id = %alert.id,
                title = %alert.title,
                description = %alert.description,
                category = %alert.category,
                metadata = %metadata,
                "CRITICAL ALERT - IMMEDIATE ACTION REQUIRED"
            ),
        }
        Ok(())
    }
}
