//! Durable service records and the status state machine.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StatusError;
use crate::spec::{PricingDescriptor, ServiceSpecification, SlaDescriptor};

/// Stable identifier of a service record, generated at submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(Uuid);

impl ServiceId {
    /// Generates a new time-ordered identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for ServiceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle status of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    /// Awaiting automated checks or human review.
    PendingApproval,
    /// Live and consumable.
    Active,
    /// Scheduled for retirement, still reachable.
    Deprecated,
    /// Policy violation or rejected approval; not consumable.
    Suspended,
    /// Soft-deleted.
    Retired,
    /// Rejected by validation or acceptance tests for this submission.
    FailedValidation,
}

impl ServiceStatus {
    /// All statuses, in table order.
    pub const ALL: [Self; 6] = [
        Self::PendingApproval,
        Self::Active,
        Self::Deprecated,
        Self::Suspended,
        Self::Retired,
        Self::FailedValidation,
    ];

    /// Returns a string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PendingApproval => "pending_approval",
            Self::Active => "active",
            Self::Deprecated => "deprecated",
            Self::Suspended => "suspended",
            Self::Retired => "retired",
            Self::FailedValidation => "failed_validation",
        }
    }

    /// Returns true if no further transition is possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Retired | Self::FailedValidation)
    }

    /// Returns true if consumers may call the service.
    #[must_use]
    pub const fn is_consumable(&self) -> bool {
        matches!(self, Self::Active | Self::Deprecated)
    }

    /// Statuses reachable from this one through the transition table.
    #[must_use]
    pub const fn successors(&self) -> &'static [Self] {
        match self {
            Self::PendingApproval => &[Self::Active, Self::Suspended, Self::FailedValidation],
            Self::Active => &[Self::Deprecated, Self::Suspended],
            Self::Deprecated => &[Self::Retired],
            Self::Suspended => &[Self::Active, Self::Retired],
            Self::Retired | Self::FailedValidation => &[],
        }
    }

    /// Returns true if the table allows moving to `next`.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        self.successors().contains(&next)
    }

    /// Checks a status change against the table.
    ///
    /// An administrative change may additionally retire a service from any
    /// non-terminal status.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError`] when the change is not allowed.
    pub fn check_transition(&self, change: StatusChange) -> Result<(), StatusError> {
        if self.is_terminal() {
            return Err(StatusError::Terminal { status: *self });
        }
        if self.can_transition_to(change.to)
            || (change.administrative && change.to == Self::Retired)
        {
            Ok(())
        } else {
            Err(StatusError::IllegalTransition {
                from: *self,
                to: change.to,
            })
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A requested status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    /// Target status.
    pub to: ServiceStatus,
    /// Set for direct administrator actions.
    pub administrative: bool,
}

impl StatusChange {
    /// A change driven by the pipeline or by the provider.
    #[must_use]
    pub const fn to(status: ServiceStatus) -> Self {
        Self {
            to: status,
            administrative: false,
        }
    }

    /// A direct administrator action.
    #[must_use]
    pub const fn administrative(status: ServiceStatus) -> Self {
        Self {
            to: status,
            administrative: true,
        }
    }
}

/// The durable record of a published (or attempted) service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// Stable identifier.
    pub id: ServiceId,
    /// Owning provider.
    pub provider_id: String,
    /// Registry-assigned identifier, present once registration succeeded.
    pub registry_id: Option<String>,
    /// The accepted specification.
    pub spec: ServiceSpecification,
    /// Current lifecycle status.
    pub status: ServiceStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// When the service first became active.
    pub published_at: Option<DateTime<Utc>>,
    /// When the service was deprecated.
    pub deprecated_at: Option<DateTime<Utc>>,
    /// Why the service was suspended.
    pub suspension_reason: Option<String>,
    /// Approval workflow associated with this submission.
    pub approval_workflow_id: Option<String>,
}

impl Service {
    /// Creates a new record in `pending_approval`.
    #[must_use]
    pub fn new(
        id: ServiceId,
        provider_id: impl Into<String>,
        spec: ServiceSpecification,
        registry_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            provider_id: provider_id.into(),
            registry_id,
            spec,
            status: ServiceStatus::PendingApproval,
            created_at: now,
            updated_at: now,
            published_at: None,
            deprecated_at: None,
            suspension_reason: None,
            approval_workflow_id: None,
        }
    }

    /// Applies a status change if the state machine allows it, stamping
    /// the lifecycle timestamps.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError`] and leaves the record untouched when the change
    /// is illegal.
    pub fn apply_status(&mut self, change: StatusChange) -> Result<(), StatusError> {
        self.status.check_transition(change)?;

        let now = Utc::now();
        match change.to {
            ServiceStatus::Active => {
                if self.published_at.is_none() {
                    self.published_at = Some(now);
                }
                self.suspension_reason = None;
            }
            ServiceStatus::Deprecated => self.deprecated_at = Some(now),
            _ => {}
        }
        self.status = change.to;
        self.updated_at = now;
        Ok(())
    }

    /// Returns true if `caller` may modify this record.
    #[must_use]
    pub fn is_owned_by(&self, caller: &Caller) -> bool {
        caller.is_admin || caller.id == self.provider_id
    }
}

/// The party issuing a command against a service record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// Caller identifier (provider id for providers).
    pub id: String,
    /// Administrators may act on any record.
    pub is_admin: bool,
}

impl Caller {
    /// A provider acting on its own records.
    #[must_use]
    pub fn provider(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_admin: false,
        }
    }

    /// A marketplace administrator.
    #[must_use]
    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_admin: true,
        }
    }
}

/// Provider-initiated field update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePatch {
    /// New version; a change republishes through the full pipeline.
    pub version: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// Replacement tag set.
    pub tags: Option<BTreeSet<String>>,
    /// Replacement capability list.
    pub capabilities: Option<Vec<String>>,
    /// Replacement pricing.
    pub pricing: Option<PricingDescriptor>,
    /// Replacement SLA.
    pub sla: Option<SlaDescriptor>,
}

impl ServicePatch {
    /// Returns true if the patch requests a version different from `current`.
    #[must_use]
    pub fn changes_version(&self, current: &str) -> bool {
        self.version.as_deref().is_some_and(|v| v != current)
    }

    /// Produces the specification that results from applying this patch.
    #[must_use]
    pub fn apply_to(&self, spec: &ServiceSpecification) -> ServiceSpecification {
        let mut next = spec.clone();
        if let Some(version) = &self.version {
            next.version.clone_from(version);
        }
        if let Some(description) = &self.description {
            next.description.clone_from(description);
        }
        if let Some(tags) = &self.tags {
            next.tags.clone_from(tags);
        }
        if let Some(capabilities) = &self.capabilities {
            next.capabilities.clone_from(capabilities);
        }
        if let Some(pricing) = &self.pricing {
            next.pricing = pricing.clone();
        }
        if let Some(sla) = &self.sla {
            next.sla = sla.clone();
        }
        next
    }
}
