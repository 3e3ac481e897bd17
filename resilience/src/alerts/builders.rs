//! Builders for the common alert scenarios.
//!
//! Each builder only shapes title, description and metadata before calling
//! [`AlertManager::trigger_alert`]; all dedup and suppression logic stays in
//! the manager.

use serde_json::{Value, json};

use super::manager::AlertManager;
use super::types::{Alert, AlertCategory, AlertSeverity, Metadata};

fn opt(value: &Option<String>) -> Value {
    value.as_deref().map_or(Value::Null, Value::from)
}

/// Failed login or token check.
#[derive(Debug, Clone, Default)]
pub struct AuthenticationFailure {
    username: Option<String>,
    ip_address: Option<String>,
    service: Option<String>,
    metadata: Metadata,
}

impl AuthenticationFailure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata.extend(metadata);
        self
    }

    pub fn trigger(self, manager: &AlertManager) -> Option<Alert> {
        let title = match &self.username {
            Some(user) => format!("Authentication failure for {user}"),
            None => "Authentication failure".to_string(),
        };
        let mut description = "Failed authentication attempt".to_string();
        if let Some(ip) = &self.ip_address {
            description.push_str(&format!(" from {ip}"));
        }
        if let Some(service) = &self.service {
            description.push_str(&format!(" on {service}"));
        }

        let mut metadata = self.metadata;
        for (key, value) in [
            ("username", self.username),
            ("ip_address", self.ip_address),
            ("service", self.service),
        ] {
            if let Some(value) = value {
                metadata.insert(key.to_string(), Value::String(value));
            }
        }

        manager.trigger_alert(
            AlertCategory::Authentication,
            &title,
            &description,
            metadata,
            None,
        )
    }
}

/// Upstream API returning errors or not answering.
#[derive(Debug, Clone)]
pub struct ApiOutage {
    service: String,
    endpoint: Option<String>,
    status_code: Option<u16>,
    error_message: Option<String>,
    metadata: Metadata,
}

impl ApiOutage {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            endpoint: None,
            status_code: None,
            error_message: None,
            metadata: Metadata::new(),
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn status_code(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata.extend(metadata);
        self
    }

    pub fn trigger(self, manager: &AlertManager) -> Option<Alert> {
        let title = format!("{} API outage", self.service);
        let mut description = format!("API service {} is experiencing issues", self.service);
        if let Some(endpoint) = &self.endpoint {
            description.push_str(&format!(" on endpoint {endpoint}"));
        }
        if let Some(status) = self.status_code {
            description.push_str(&format!(" (HTTP {status})"));
        }

        let mut metadata = self.metadata;
        metadata.insert("service".into(), json!(self.service));
        metadata.insert("endpoint".into(), opt(&self.endpoint));
        metadata.insert("status_code".into(), json!(self.status_code));
        metadata.insert("error_message".into(), opt(&self.error_message));

        manager.trigger_alert(
            AlertCategory::ApiOutage,
            &title,
            &description,
            metadata,
            None,
        )
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowFailure {
    workflow_id: String,
    step: Option<String>,
    error_message: Option<String>,
    metadata: Metadata,
}

impl WorkflowFailure {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            step: None,
            error_message: None,
            metadata: Metadata::new(),
        }
    }

    pub fn step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata.extend(metadata);
        self
    }

    pub fn trigger(self, manager: &AlertManager) -> Option<Alert> {
        let title = format!("Workflow failure: {}", self.workflow_id);
        let mut description = format!("Workflow {} failed", self.workflow_id);
        if let Some(step) = &self.step {
            description.push_str(&format!(" at step {step}"));
        }
        if let Some(message) = &self.error_message {
            description.push_str(&format!(": {message}"));
        }

        let mut metadata = self.metadata;
        metadata.insert("workflow_id".into(), json!(self.workflow_id));
        metadata.insert("step".into(), opt(&self.step));
        metadata.insert("error_message".into(), opt(&self.error_message));

        manager.trigger_alert(
            AlertCategory::WorkflowFailure,
            &title,
            &description,
            metadata,
            None,
        )
    }
}

/// Resource usage crossing a percentage threshold.
#[derive(Debug, Clone)]
pub struct ResourceThreshold {
    resource_type: String,
    current_value: f64,
    threshold: f64,
    metadata: Metadata,
}

impl ResourceThreshold {
    pub fn new(resource_type: impl Into<String>, current_value: f64, threshold: f64) -> Self {
        Self {
            resource_type: resource_type.into(),
            current_value,
            threshold,
            metadata: Metadata::new(),
        }
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata.extend(metadata);
        self
    }

    pub fn trigger(self, manager: &AlertManager) -> Option<Alert> {
        let title = format!("High {} usage", self.resource_type);
        let description = format!(
            "{} usage is {:.1}% (threshold: {:.1}%)",
            self.resource_type, self.current_value, self.threshold
        );

        let mut metadata = self.metadata;
        metadata.insert("resource_type".into(), json!(self.resource_type));
        metadata.insert("current_value".into(), json!(self.current_value));
        metadata.insert("threshold".into(), json!(self.threshold));

        manager.trigger_alert(
            AlertCategory::SystemResource,
            &title,
            &description,
            metadata,
            None,
        )
    }
}

/// Security finding. Always raised as critical.
#[derive(Debug, Clone)]
pub struct SecurityIssue {
    issue_type: String,
    description: String,
    metadata: Metadata,
}

impl SecurityIssue {
    pub fn new(issue_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            issue_type: issue_type.into(),
            description: description.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata.extend(metadata);
        self
    }

    pub fn trigger(self, manager: &AlertManager) -> Option<Alert> {
        let title = format!("Security issue: {}", self.issue_type);
        manager.trigger_alert(
            AlertCategory::Security,
            &title,
            &self.description,
            self.metadata,
            Some(AlertSeverity::Critical),
        )
    }
}
