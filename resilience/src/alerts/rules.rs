//! Per-category alert rules.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::{AlertCategory, AlertSeverity};
use crate::retry::ConfigurationError;

/// Threshold/window/suppression policy for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRule {
    pub category: AlertCategory,
    #[serde(rename = "severity")]
    pub default_severity: AlertSeverity,
    /// Occurrences needed inside the window before an alert fires.
    pub threshold: u32,
    pub window_minutes: u32,
    pub suppress_minutes: u32,
    pub enabled: bool,
}

impl AlertRule {
    pub const fn new(
        category: AlertCategory,
        default_severity: AlertSeverity,
        threshold: u32,
        window_minutes: u32,
        suppress_minutes: u32,
    ) -> Self {
        Self {
            category,
            default_severity,
            threshold,
            window_minutes,
            suppress_minutes,
            enabled: true,
        }
    }

    /// Built-in rule for `category`.
    pub const fn default_for(category: AlertCategory) -> Self {
        use AlertCategory as C;
        use AlertSeverity as S;
        match category {
            C::Authentication => Self::new(category, S::Critical, 3, 5, 15),
            C::ApiOutage => Self::new(category, S::High, 2, 10, 30),
            C::WorkflowFailure => Self::new(category, S::Medium, 1, 1, 10),
            C::SystemResource => Self::new(category, S::High, 1, 5, 20),
            C::DataCorruption => Self::new(category, S::Critical, 1, 1, 60),
            C::Security => Self::new(category, S::Critical, 1, 1, 30),
            C::Performance => Self::new(category, S::Low, 5, 15, 60),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.threshold < 1 {
            return Err(ConfigurationError::InvalidAlertThreshold {
                category: self.category.to_string(),
                threshold: self.threshold,
            });
        }
        Ok(())
    }
}

/// Category -> rule mapping consulted by the alert manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertRuleTable {
    rules: BTreeMap<AlertCategory, AlertRule>,
}

impl Default for AlertRuleTable {
    fn default() -> Self {
        Self {
            rules: AlertCategory::ALL
                .into_iter()
                .map(|category| (category, AlertRule::default_for(category)))
                .collect(),
        }
    }
}

impl AlertRuleTable {
    /// Table with no rules; every category is ignored until one is added.
    pub fn empty() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    pub fn get(&self, category: AlertCategory) -> Option<&AlertRule> {
        self.rules.get(&category)
    }

    /// Insert or replace the rule for `rule.category`.
    pub fn insert(&mut self, rule: AlertRule) -> Result<Option<AlertRule>, ConfigurationError> {
        rule.validate()?;
        Ok(self.rules.insert(rule.category, rule))
    }

    pub fn iter(&self) -> impl Iterator<Item = &AlertRule> {
        self.rules.values()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.rules.values().try_for_each(AlertRule::validate)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_table_covers_every_category() {
        let table = AlertRuleTable::default();
        assert_eq!(table.len(), AlertCategory::ALL.len());
        let auth = table.get(AlertCategory::Authentication).unwrap();
        assert_eq!(auth.default_severity, AlertSeverity::Critical);
        assert_eq!(
            (auth.threshold, auth.window_minutes, auth.suppress_minutes),
            (3, 5, 15)
        );
        let perf = table.get(AlertCategory::Performance).unwrap();
        assert_eq!(perf.default_severity, AlertSeverity::Low);
        assert_eq!(perf.threshold, 5);
        assert!(table.iter().all(|rule| rule.enabled));
    }

    #[test]
    fn insert_rejects_zero_threshold() {
        let mut table = AlertRuleTable::empty();
        let rule = AlertRule {
            threshold: 0,
            ..AlertRule::default_for(AlertCategory::Security)
        };
        assert_eq!(
            table.insert(rule),
            Err(ConfigurationError::InvalidAlertThreshold {
                category: "security".into(),
                threshold: 0,
            })
        );
        assert!(table.is_empty());
    }

    #[test]
    fn rule_serializes_severity_field() {
        let json = serde_json::to_value(AlertRule::default_for(AlertCategory::ApiOutage)).unwrap();
        assert_eq!(json["severity"], "high");
        assert_eq!(json["category"], "api_outage");
    }
}
