//! Alert domain types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Free-form context attached to an alert. Repeated occurrences merge into it.
pub type Metadata = BTreeMap<String, serde_json::Value>;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub const ALL: [AlertSeverity; 4] = [
        AlertSeverity::Low,
        AlertSeverity::Medium,
        AlertSeverity::High,
        AlertSeverity::Critical,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AlertSeverity::Low => "low",
            AlertSeverity::Medium => "medium",
            AlertSeverity::High => "high",
            AlertSeverity::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AlertSeverity::ALL
            .into_iter()
            .find(|severity| severity.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown alert severity: {s}"))
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    Authentication,
    ApiOutage,
    WorkflowFailure,
    SystemResource,
    DataCorruption,
    Security,
    Performance,
}

impl AlertCategory {
    pub const ALL: [AlertCategory; 7] = [
        AlertCategory::Authentication,
        AlertCategory::ApiOutage,
        AlertCategory::WorkflowFailure,
        AlertCategory::SystemResource,
        AlertCategory::DataCorruption,
        AlertCategory::Security,
        AlertCategory::Performance,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AlertCategory::Authentication => "authentication",
            AlertCategory::ApiOutage => "api_outage",
            AlertCategory::WorkflowFailure => "workflow_failure",
            AlertCategory::SystemResource => "system_resource",
            AlertCategory::DataCorruption => "data_corruption",
            AlertCategory::Security => "security",
            AlertCategory::Performance => "performance",
        }
    }
}

impl fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        AlertCategory::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
            .ok_or_else(|| format!("unknown alert category: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
    /// Reserved for channels that mute an alert; the manager never sets it.
    Suppressed,
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
            AlertStatus::Suppressed => "suppressed",
        };
        f.write_str(s)
    }
}

/// One deduplicated alert.
///
/// `count` is the number of occurrences that cleared both suppression and
/// threshold, starting at 1. `resolved_at` is set exactly when `status` is
/// [`AlertStatus::Resolved`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub title: String,
    pub description: String,
    pub severity: AlertSeverity,
    pub category: AlertCategory,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub count: u64,
    pub last_occurrence: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Aggregate view over the alert registry.
///
/// Every severity and category appears in the maps, with zero when no active
/// alert matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSummary {
    pub total: usize,
    pub active: usize,
    pub active_by_severity: BTreeMap<AlertSeverity, usize>,
    pub active_by_category: BTreeMap<AlertCategory, usize>,
    /// Creation time of the oldest alert still in the active state.
    pub oldest_unresolved: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn severities_are_ordered() {
        assert!(AlertSeverity::Low < AlertSeverity::Medium);
        assert!(AlertSeverity::Medium < AlertSeverity::High);
        assert!(AlertSeverity::High < AlertSeverity::Critical);
    }

    #[test]
    fn categories_round_trip_through_strings() {
        for category in AlertCategory::ALL {
            assert_eq!(category.as_str().parse::<AlertCategory>(), Ok(category));
        }
        assert_eq!(
            "API-Outage".parse::<AlertCategory>(),
            Ok(AlertCategory::ApiOutage)
        );
        assert!("disk".parse::<AlertCategory>().is_err());
    }

    #[test]
    fn summary_serializes_enum_keys_as_strings() {
        let summary = AlertSummary {
            total: 1,
            active: 1,
            active_by_severity: BTreeMap::from([(AlertSeverity::High, 1)]),
            active_by_category: BTreeMap::from([(AlertCategory::ApiOutage, 1)]),
            oldest_unresolved: None,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["active_by_severity"]["high"], 1);
        assert_eq!(json["active_by_category"]["api_outage"], 1);
    }
}
