//! Alert registry with deduplication, sliding-window thresholds and
//! suppression.
//!
//! A single mutex serializes every mutation, so the count, threshold and
//! suppression bookkeeping stays consistent under concurrent triggers.
//! Notification delivery happens after the lock is released, on a detached
//! tokio task, or on a short-lived delivery thread when the caller is not on
//! a runtime.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use sha2::{Digest, Sha256};
use tokio_util::task::TaskTracker;
use tracing::{Dispatch, debug, error, info, warn};

use super::notifier::{LogChannel, Notification, NotificationChannel};
use super::rules::{AlertRule, AlertRuleTable};
use super::types::{Alert, AlertCategory, AlertSeverity, AlertStatus, AlertSummary, Metadata};
use crate::clock::{Clock, SystemClock};
use crate::retry::ConfigurationError;

const ALERT_ID_LEN: usize = 12;

/// Minimum spacing between sweeps of idle tracking entries.
const SWEEP_INTERVAL: TimeDelta = TimeDelta::minutes(1);

/// Occurrence window and suppression bookkeeping for one alert id.
#[derive(Debug)]
struct Tracking {
    category: AlertCategory,
    occurrences: VecDeque<DateTime<Utc>>,
    /// When the alert last fired; suppression lasts `suppress_minutes` from here.
    fired_at: Option<DateTime<Utc>>,
}

impl Tracking {
    fn new(category: AlertCategory) -> Self {
        Self {
            category,
            occurrences: VecDeque::new(),
            fired_at: None,
        }
    }

    fn suppressed(&self, now: DateTime<Utc>, rule: &AlertRule) -> bool {
        self.fired_at
            .is_some_and(|fired_at| now < fired_at + minutes(rule.suppress_minutes))
    }

    /// Drop occurrences at or before the start of the window.
    fn prune(&mut self, now: DateTime<Utc>, rule: &AlertRule) {
        let window_start = now - minutes(rule.window_minutes);
        while self
            .occurrences
            .front()
            .is_some_and(|seen| *seen <= window_start)
        {
            self.occurrences.pop_front();
        }
    }
}

#[derive(Debug, Default)]
struct ManagerState {
    rules: AlertRuleTable,
    alerts: HashMap<String, Alert>,
    tracking: HashMap<String, Tracking>,
    last_sweep: Option<DateTime<Utc>>,
}

impl ManagerState {
    /// Forget ids with no occurrence left in their window and no running
    /// suppression. Ids from earlier days are never looked up again, so
    /// this is what reclaims them.
    fn sweep(&mut self, now: DateTime<Utc>) {
        if self
            .last_sweep
            .is_some_and(|swept_at| now - swept_at < SWEEP_INTERVAL)
        {
            return;
        }
        self.last_sweep = Some(now);

        let before = self.tracking.len();
        let rules = &self.rules;
        self.tracking.retain(|_, tracking| {
            let Some(rule) = rules.get(tracking.category).filter(|r| r.enabled) else {
                return false;
            };
            tracking.prune(now, rule);
            !tracking.occurrences.is_empty() || tracking.suppressed(now, rule)
        });

        let dropped = before - self.tracking.len();
        if dropped > 0 {
            debug!(
                dropped,
                remaining = self.tracking.len(),
                "dropped idle alert tracking"
            );
        }
    }
}

/// Process-wide alert registry.
///
/// Construct one at startup and share it (typically as `Arc<AlertManager>`)
/// with every component that reports failures.
pub struct AlertManager {
    clock: Arc<dyn Clock>,
    channels: Vec<Arc<dyn NotificationChannel>>,
    pending: TaskTracker,
    flushing: tokio::sync::Mutex<()>,
    state: Mutex<ManagerState>,
}

impl fmt::Debug for AlertManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channels: Vec<&str> = self.channels.iter().map(|c| c.name()).collect();
        f.debug_struct("AlertManager")
            .field("clock", &self.clock)
            .field("channels", &channels)
            .field("pending_notifications", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new(AlertRuleTable::default())
    }
}

impl AlertManager {
    /// Manager using the wall clock and the log-only channel.
    pub fn new(rules: AlertRuleTable) -> Self {
        Self {
            clock: Arc::new(SystemClock),
            channels: vec![Arc::new(LogChannel)],
            pending: TaskTracker::new(),
            flushing: tokio::sync::Mutex::new(()),
            state: Mutex::new(ManagerState {
                rules,
                ..ManagerState::default()
            }),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the notification channels. An empty list disables delivery.
    pub fn with_channels(mut self, channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        self.channels = channels;
        self
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deterministic id for an alert: same category and title on the same
    /// UTC calendar day always map to the same id.
    pub fn alert_id_for(category: AlertCategory, title: &str, date: NaiveDate) -> String {
        let digest = Sha256::digest(format!("{category}_{title}_{date}").as_bytes());
        let mut id = format!("{digest:x}");
        id.truncate(ALERT_ID_LEN);
        id
    }

    /// Report one occurrence of a failure.
    ///
    /// Returns the alert when this occurrence fires it; `None` when the
    /// category has no enabled rule, the alert is suppressed, or the
    /// threshold has not been reached yet. `severity` only applies when the
    /// alert is created.
    ///
    /// Notifications are spawned on the current tokio runtime. Outside a
    /// runtime they are delivered from a dedicated thread instead. Either
    /// way this call does not wait for them.
    pub fn trigger_alert(
        &self,
        category: AlertCategory,
        title: &str,
        description: &str,
        metadata: Metadata,
        severity: Option<AlertSeverity>,
    ) -> Option<Alert> {
        let mut guard = self.lock();
        let now = self.clock.now();
        let state = &mut *guard;
        state.sweep(now);

        let Some(rule) = state.rules.get(category).copied().filter(|r| r.enabled) else {
            debug!(category = %category, "no enabled alert rule");
            return None;
        };

        let alert_id = Self::alert_id_for(category, title, now.date_naive());
        let tracking = state
            .tracking
            .entry(alert_id.clone())
            .or_insert_with(|| Tracking::new(category));

        if tracking.suppressed(now, &rule) {
            debug!(alert_id = %alert_id, category = %category, "alert suppressed");
            return None;
        }
        tracking.fired_at = None;

        tracking.prune(now, &rule);
        tracking.occurrences.push_back(now);
        let seen = tracking.occurrences.len();
        if seen < rule.threshold as usize {
            debug!(
                alert_id = %alert_id,
                category = %category,
                occurrences = seen,
                threshold = rule.threshold,
                "alert threshold not met"
            );
            return None;
        }
        tracking.fired_at = Some(now);

        let alert = match state.alerts.entry(alert_id.clone()) {
            Entry::Occupied(mut entry) => {
                let alert = entry.get_mut();
                alert.status = AlertStatus::Active;
                alert.resolved_at = None;
                alert.count += 1;
                alert.last_occurrence = now;
                alert.updated_at = now;
                alert.metadata.extend(metadata);
                alert.clone()
            }
            Entry::Vacant(entry) => entry
                .insert(Alert {
                    id: alert_id,
                    title: title.to_string(),
                    description: description.to_string(),
                    severity: severity.unwrap_or(rule.default_severity),
                    category,
                    status: AlertStatus::Active,
                    created_at: now,
                    updated_at: now,
                    resolved_at: None,
                    count: 1,
                    last_occurrence: now,
                    metadata,
                })
                .clone(),
        };
        drop(guard);

        warn!(
            alert_id = %alert.id,
            title = %alert.title,
            category = %alert.category,
            severity = %alert.severity,
            count = alert.count,
            "alert triggered"
        );
        self.dispatch(&alert);
        Some(alert)
    }

    fn dispatch(&self, alert: &Alert) {
        if self.channels.is_empty() {
            return;
        }
        let notifications = Notification::for_alert(alert);
        let channels = self.channels.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(self.pending.track_future(deliver(channels, notifications)));
            }
            Err(_) => self.deliver_on_thread(&alert.id, channels, notifications),
        }
    }

    /// Delivery for callers without a runtime: a named thread drives
    /// `deliver` on its own current-thread runtime. The tracker token keeps
    /// `flush_notifications` waiting until the thread is done.
    fn deliver_on_thread(
        &self,
        alert_id: &str,
        channels: Vec<Arc<dyn NotificationChannel>>,
        notifications: Vec<Notification>,
    ) {
        let token = self.pending.token();
        let dispatch = tracing::dispatcher::get_default(Dispatch::clone);
        let thread_alert_id = alert_id.to_string();
        let spawned = std::thread::Builder::new()
            .name("bulwark-alert-delivery".into())
            .spawn(move || {
                let _token = token;
                tracing::dispatcher::with_default(&dispatch, || {
                    match tokio::runtime::Builder::new_current_thread()
                        .enable_time()
                        .build()
                    {
                        Ok(runtime) => runtime.block_on(deliver(channels, notifications)),
                        Err(err) => error!(
                            alert_id = %thread_alert_id,
                            error = %err,
                            "failed to start alert delivery runtime"
                        ),
                    }
                });
            });
        if let Err(err) = spawned {
            error!(alert_id, error = %err, "failed to spawn alert delivery thread");
        }
    }

    /// Wait until every notification spawned so far has been delivered (or
    /// has failed). Triggers may continue while this waits. Concurrent
    /// flushes take turns.
    pub async fn flush_notifications(&self) {
        let _turn = self.flushing.lock().await;
        self.pending.close();
        self.pending.wait().await;
        self.pending.reopen();
    }

    /// Mark an alert as seen by an operator. False when the id is unknown or
    /// the alert is already resolved.
    pub fn acknowledge(&self, alert_id: &str) -> bool {
        let mut state = self.lock();
        let now = self.clock.now();
        let Some(alert) = state.alerts.get_mut(alert_id) else {
            return false;
        };
        if alert.status == AlertStatus::Resolved {
            return false;
        }
        alert.status = AlertStatus::Acknowledged;
        alert.updated_at = now;
        info!(alert_id, "alert acknowledged");
        true
    }

    /// Close an alert. False when the id is unknown or already resolved, so
    /// repeated calls leave the first resolution untouched.
    pub fn resolve(&self, alert_id: &str) -> bool {
        let mut state = self.lock();
        let now = self.clock.now();
        let Some(alert) = state.alerts.get_mut(alert_id) else {
            return false;
        };
        if alert.status == AlertStatus::Resolved {
            return false;
        }
        alert.status = AlertStatus::Resolved;
        alert.resolved_at = Some(now);
        alert.updated_at = now;
        info!(alert_id, "alert resolved");
        true
    }

    pub fn get(&self, alert_id: &str) -> Option<Alert> {
        self.lock().alerts.get(alert_id).cloned()
    }

    /// Alerts in the active state, oldest first.
    pub fn list_active(&self) -> Vec<Alert> {
        let mut active: Vec<Alert> = self
            .lock()
            .alerts
            .values()
            .filter(|alert| alert.status == AlertStatus::Active)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        active
    }

    pub fn summary(&self) -> AlertSummary {
        let mut active_by_severity: BTreeMap<AlertSeverity, usize> =
            AlertSeverity::ALL.into_iter().map(|s| (s, 0)).collect();
        let mut active_by_category: BTreeMap<AlertCategory, usize> =
            AlertCategory::ALL.into_iter().map(|c| (c, 0)).collect();
        let mut active = 0;
        let mut oldest_unresolved: Option<DateTime<Utc>> = None;

        let state = self.lock();
        for alert in state.alerts.values() {
            if alert.status != AlertStatus::Active {
                continue;
            }
            active += 1;
            *active_by_severity.entry(alert.severity).or_default() += 1;
            *active_by_category.entry(alert.category).or_default() += 1;
            oldest_unresolved = Some(match oldest_unresolved {
                Some(oldest) => oldest.min(alert.created_at),
                None => alert.created_at,
            });
        }

        AlertSummary {
            total: state.alerts.len(),
            active,
            active_by_severity,
            active_by_category,
            oldest_unresolved,
        }
    }

    pub fn rule(&self, category: AlertCategory) -> Option<AlertRule> {
        self.lock().rules.get(category).copied()
    }

    /// Replace the rule for `rule.category`, returning the previous one.
    pub fn set_rule(&self, rule: AlertRule) -> Result<Option<AlertRule>, ConfigurationError> {
        self.lock().rules.insert(rule)
    }
}

fn minutes(value: u32) -> TimeDelta {
    TimeDelta::minutes(i64::from(value))
}

async fn deliver(channels: Vec<Arc<dyn NotificationChannel>>, notifications: Vec<Notification>) {
    for notification in &notifications {
        for channel in &channels {
            if let Err(err) = channel.send(notification).await {
                error!(
                    channel = channel.name(),
                    alert_id = %notification.alert.id,
                    kind = ?notification.kind,
                    error = %err,
                    "failed to send alert notification"
                );
            }
        }
    }
}
