//! Per-submission pipeline state.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use bazaar_core::{Service, ServiceId, ServiceSpecification, ServiceStatus, ValidationReport};
use serde::Serialize;

use crate::governance::ApprovalDecision;
use crate::policy::PolicyResult;
use crate::testing::TestSuiteResult;

/// Pipeline phases in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Structural validation.
    Validation,
    /// OpenAPI document validation.
    InterfaceValidation,
    /// Policy compliance.
    Policy,
    /// Registry registration.
    Registration,
    /// Record persistence.
    Persist,
    /// Automated test suite.
    Testing,
    /// Approval workflow.
    Approval,
    /// Activation.
    Activation,
}

impl Phase {
    /// Returns the stable string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::InterfaceValidation => "interface-validation",
            Self::Policy => "policy",
            Self::Registration => "registration",
            Self::Persist => "persist",
            Self::Testing => "testing",
            Self::Approval => "approval",
            Self::Activation => "activation",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ephemeral state carried through one `publish` call. Never persisted.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    /// Service identifier, generated at submission.
    pub service_id: ServiceId,
    /// Submitting provider.
    pub provider_id: String,
    /// The submitted specification.
    pub spec: ServiceSpecification,
    /// When the pipeline started.
    pub started_at: Instant,
    /// Structural validation result.
    pub validation: Option<ValidationReport>,
    /// OpenAPI validation result, when a document was attached.
    pub interface_validation: Option<ValidationReport>,
    /// Policy result; `None` when skipped by fail-open.
    pub policy: Option<PolicyResult>,
    /// Registry identifier once registered.
    pub registry_id: Option<String>,
    /// Whether the record exists in storage.
    pub persisted: bool,
    /// Test suite result.
    pub test_suite: Option<TestSuiteResult>,
    /// Approval workflow, when one was opened or resumed.
    pub approval_workflow_id: Option<String>,
    /// Approval decision.
    pub approval: Option<ApprovalDecision>,
    phase: Phase,
    attempts: BTreeMap<Phase, u32>,
}

impl PipelineContext {
    /// Starts a context for a new submission.
    pub fn new(service_id: ServiceId, provider_id: impl Into<String>, spec: ServiceSpecification) -> Self {
        Self {
            service_id,
            provider_id: provider_id.into(),
            spec,
            started_at: Instant::now(),
            validation: None,
            interface_validation: None,
            policy: None,
            registry_id: None,
            persisted: false,
            test_suite: None,
            approval_workflow_id: None,
            approval: None,
            phase: Phase::Validation,
            attempts: BTreeMap::new(),
        }
    }

    /// Marks `phase` as the current phase.
    pub fn enter(&mut self, phase: Phase) {
        tracing::debug!(service_id = %self.service_id, %phase, "Entering phase");
        self.phase = phase;
    }

    /// The phase currently executing.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Records how many attempts `phase` took.
    pub fn record_attempts(&mut self, phase: Phase, attempts: u32) {
        self.attempts.insert(phase, attempts);
    }

    /// Attempts recorded for `phase`, zero if it made no retried call.
    #[must_use]
    pub fn attempts(&self, phase: Phase) -> u32 {
        self.attempts.get(&phase).copied().unwrap_or(0)
    }

    /// All recorded attempt counts.
    #[must_use]
    pub const fn attempt_counts(&self) -> &BTreeMap<Phase, u32> {
        &self.attempts
    }

    /// A record view of this submission in `status`, for notifications
    /// about submissions that were never persisted.
    #[must_use]
    pub fn snapshot(&self, status: ServiceStatus) -> Service {
        let mut service = Service::new(
            self.service_id,
            self.provider_id.clone(),
            self.spec.clone(),
            self.registry_id.clone(),
        );
        service.status = status;
        service.approval_workflow_id.clone_from(&self.approval_workflow_id);
        service
    }

    /// Time since the pipeline started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}
