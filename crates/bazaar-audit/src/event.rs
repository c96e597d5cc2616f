//! Lifecycle event definitions.

use std::collections::BTreeMap;
use std::fmt;

use bazaar_core::{ServiceId, ServiceStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::{Timestamp, Uuid};

/// Generates a new v7 UUID for lifecycle events.
fn new_event_id() -> Uuid {
    let ts = Timestamp::now(uuid::NoContext);
    Uuid::new_v7(ts)
}

/// Severity level for lifecycle events.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    /// Informational event
    #[default]
    Info,
    /// Degraded or rejected outcome
    Warning,
    /// Pipeline failure
    Error,
}

impl fmt::Display for EventSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Stable event-type tags emitted by the publishing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleEventType {
    /// A specification was submitted.
    #[serde(rename = "service.submitted")]
    Submitted,
    /// Structural or interface validation failed.
    #[serde(rename = "service.validation_failed")]
    ValidationFailed,
    /// The policy engine reported the service non-compliant.
    #[serde(rename = "service.policy_rejected")]
    PolicyRejected,
    /// The registry accepted the service.
    #[serde(rename = "service.registered")]
    Registered,
    /// The automated test suite finished.
    #[serde(rename = "service.tests_completed")]
    TestsCompleted,
    /// A human approval workflow was opened.
    #[serde(rename = "service.approval_requested")]
    ApprovalRequested,
    /// The service went live.
    #[serde(rename = "service.activated")]
    Activated,
    /// The service was suspended.
    #[serde(rename = "service.suspended")]
    Suspended,
    /// The pipeline failed on a dependency or internal fault.
    #[serde(rename = "service.failed")]
    Failed,
    /// A registry entry was rolled back.
    #[serde(rename = "service.rolled_back")]
    RolledBack,
    /// The service was deprecated.
    #[serde(rename = "service.deprecated")]
    Deprecated,
    /// A suspended service was reinstated.
    #[serde(rename = "service.reinstated")]
    Reinstated,
    /// The service was retired.
    #[serde(rename = "service.retired")]
    Retired,
    /// Provider fields were updated.
    #[serde(rename = "service.updated")]
    Updated,
}

impl LifecycleEventType {
    /// Returns the stable tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "service.submitted",
            Self::ValidationFailed => "service.validation_failed",
            Self::PolicyRejected => "service.policy_rejected",
            Self::Registered => "service.registered",
            Self::TestsCompleted => "service.tests_completed",
            Self::ApprovalRequested => "service.approval_requested",
            Self::Activated => "service.activated",
            Self::Suspended => "service.suspended",
            Self::Failed => "service.failed",
            Self::RolledBack => "service.rolled_back",
            Self::Deprecated => "service.deprecated",
            Self::Reinstated => "service.reinstated",
            Self::Retired => "service.retired",
            Self::Updated => "service.updated",
        }
    }

    /// Default severity for events of this type.
    #[must_use]
    pub const fn default_severity(&self) -> EventSeverity {
        match self {
            Self::Failed | Self::RolledBack => EventSeverity::Error,
            Self::ValidationFailed | Self::PolicyRejected | Self::Suspended => {
                EventSeverity::Warning
            }
            _ => EventSeverity::Info,
        }
    }

    /// The event announcing entry into `status`, if there is one.
    #[must_use]
    pub const fn for_status(status: ServiceStatus) -> Option<Self> {
        match status {
            ServiceStatus::Active => Some(Self::Activated),
            ServiceStatus::Suspended => Some(Self::Suspended),
            ServiceStatus::Deprecated => Some(Self::Deprecated),
            ServiceStatus::Retired => Some(Self::Retired),
            ServiceStatus::FailedValidation => Some(Self::ValidationFailed),
            ServiceStatus::PendingApproval => None,
        }
    }
}

impl fmt::Display for LifecycleEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A service lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    /// Unique event ID
    pub id: Uuid,

    /// Event timestamp
    pub timestamp: DateTime<Utc>,

    /// Stable event-type tag
    pub event_type: LifecycleEventType,

    /// Event severity
    pub severity: EventSeverity,

    /// Service the event concerns
    pub service_id: ServiceId,

    /// Provider of the service
    pub provider_id: String,

    /// Service status after the event, when it changed one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ServiceStatus>,

    /// Phase-specific details
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,

    /// Correlation ID for tracing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl LifecycleEvent {
    /// Creates an event with the type's default severity.
    #[must_use]
    pub fn new(
        event_type: LifecycleEventType,
        service_id: ServiceId,
        provider_id: impl Into<String>,
    ) -> Self {
        Self {
            id: new_event_id(),
            timestamp: Utc::now(),
            event_type,
            severity: event_type.default_severity(),
            service_id,
            provider_id: provider_id.into(),
            status: None,
            metadata: BTreeMap::new(),
            correlation_id: None,
        }
    }

    /// Sets the resulting status.
    #[must_use]
    pub const fn with_status(mut self, status: ServiceStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Overrides the severity.
    #[must_use]
    pub const fn with_severity(mut self, severity: EventSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// Sets the correlation ID.
    #[must_use]
    pub fn with_correlation_id(mut self, id: &str) -> Self {
        self.correlation_id = Some(id.to_string());
        self
    }
}
