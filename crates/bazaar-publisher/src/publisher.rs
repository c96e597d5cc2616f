//! The publishing orchestrator.
//!
//! [`Publisher::publish`] drives a submission through validation, policy,
//! registration, persistence, testing, approval and activation. Phases run
//! in order and short-circuit: the first phase that rejects the submission
//! decides its final status. A registry entry is rolled back when the tests
//! fail or the pipeline errors after registration. A service suspended by
//! an approval decision keeps its entry, marked `suspended`, so an
//! administrator can reinstate it.
//!
//! Expected outcomes come back as a [`PublishOutcome`]; only conflicts,
//! missing records, authorization failures, exhausted dependencies and
//! internal faults are errors.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use bazaar_audit::{AnalyticsSink, LifecycleEvent, LifecycleEventType};
use bazaar_core::{
    Caller, OpenApiValidator, Service, ServiceId, ServicePatch, ServiceSpecification,
    ServiceStatus, ServiceValidator, StatusChange, StatusError,
};
use bazaar_registry::Registry;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::{PolicyFailureMode, PublisherConfig};
use crate::context::{Phase, PipelineContext};
use crate::error::{FailureKind, PublishError, Result, StoreError};
use crate::governance::{ApprovalDecision, ApprovalRequest, Governance};
use crate::policy::PolicyEngine;
use crate::probe::EndpointProbe;
use crate::retry::Exhausted;
use crate::store::{RecordUpdate, SearchFilter, SearchPage, ServiceStore};
use crate::testing::TestOrchestrator;

/// External systems the publisher talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// Compliance policy engine.
    pub policy: Arc<dyn PolicyEngine>,
    /// Catalog registry.
    pub registry: Arc<dyn Registry>,
    /// Approval workflows and dashboard notifications.
    pub governance: Arc<dyn Governance>,
    /// Durable record storage.
    pub store: Arc<dyn ServiceStore>,
    /// Lifecycle event sink.
    pub analytics: Arc<dyn AnalyticsSink>,
    /// HTTP probe used by the test suite.
    pub probe: Arc<dyn EndpointProbe>,
}

/// Caller-facing result of a publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOutcome {
    /// Generated service identifier.
    pub service_id: ServiceId,
    /// Final status of the submission.
    pub status: ServiceStatus,
    /// Human-readable explanation.
    pub message: String,
    /// Failure taxonomy for submissions that did not become active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
}

impl PublishOutcome {
    /// Returns true if the service went live.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == ServiceStatus::Active
    }

    fn settled(service: &Service) -> Self {
        Self {
            service_id: service.id,
            status: service.status,
            message: format!(
                "service {}@{} is already {}",
                service.spec.name, service.spec.version, service.status
            ),
            kind: None,
        }
    }
}

/// Result of [`Publisher::update_service`].
#[derive(Debug, Clone)]
pub enum UpdateOutcome {
    /// The record was edited in place.
    Updated(Service),
    /// The patch changed the version; a new record went through the pipeline.
    Republished(PublishOutcome),
}

/// Why a submission stopped short of `active`.
#[derive(Debug)]
struct Rejection {
    status: ServiceStatus,
    kind: FailureKind,
    event: LifecycleEventType,
    message: String,
    /// Whether the registry entry is removed. Services suspended by an
    /// approval decision keep theirs so they can be reinstated.
    rollback: bool,
}

impl Rejection {
    fn validation(message: String) -> Self {
        Self {
            status: ServiceStatus::FailedValidation,
            kind: FailureKind::ValidationFailure,
            event: LifecycleEventType::ValidationFailed,
            message,
            rollback: true,
        }
    }

    fn policy(message: String) -> Self {
        Self {
            status: ServiceStatus::Suspended,
            kind: FailureKind::PolicyViolation,
            event: LifecycleEventType::PolicyRejected,
            message,
            rollback: true,
        }
    }

    fn tests(message: String) -> Self {
        Self {
            status: ServiceStatus::FailedValidation,
            kind: FailureKind::TestSuiteFailure,
            event: LifecycleEventType::Failed,
            message,
            rollback: true,
        }
    }

    fn approval_rejected(reason: Option<String>) -> Self {
        Self {
            status: ServiceStatus::Suspended,
            kind: FailureKind::ApprovalRejected,
            event: LifecycleEventType::Suspended,
            message: reason.map_or_else(
                || "approval rejected".to_string(),
                |reason| format!("approval rejected: {reason}"),
            ),
            rollback: false,
        }
    }

    fn approval_timeout(wait: Duration) -> Self {
        Self {
            status: ServiceStatus::Suspended,
            kind: FailureKind::ApprovalTimeout,
            event: LifecycleEventType::Suspended,
            message: format!("no approval decision within {}s", wait.as_secs()),
            rollback: false,
        }
    }
}

/// How the pipeline stopped.
enum Halt {
    Rejected(Rejection),
    Failed(PublishError),
}

impl From<Rejection> for Halt {
    fn from(rejection: Rejection) -> Self {
        Self::Rejected(rejection)
    }
}

impl From<PublishError> for Halt {
    fn from(err: PublishError) -> Self {
        Self::Failed(err)
    }
}

impl From<StoreError> for Halt {
    fn from(err: StoreError) -> Self {
        Self::Failed(err.into())
    }
}

/// A status command on a single record.
struct Transition {
    action: &'static str,
    change: StatusChange,
    requires: Option<ServiceStatus>,
    reason: Option<String>,
    event: LifecycleEventType,
}

/// Longest pause between attempts to resume an interrupted approval wait.
const MAX_APPROVAL_RETRY_DELAY: Duration = Duration::from_secs(60);

fn dependency<E: Display>(
    service_id: ServiceId,
    dependency: &'static str,
    exhausted: &Exhausted<E>,
) -> PublishError {
    PublishError::Dependency {
        service_id,
        dependency,
        attempts: exhausted.attempts,
        message: exhausted.last_error.to_string(),
    }
}

/// Drives service submissions through the publishing pipeline.
pub struct Publisher {
    policy: Arc<dyn PolicyEngine>,
    registry: Arc<dyn Registry>,
    governance: Arc<dyn Governance>,
    store: Arc<dyn ServiceStore>,
    analytics: Arc<dyn AnalyticsSink>,
    validator: ServiceValidator,
    openapi: OpenApiValidator,
    tests: TestOrchestrator,
    config: PublisherConfig,
    /// Event and notification deliveries not yet awaited by [`Publisher::flush`].
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl Publisher {
    /// Creates a publisher.
    pub fn new(collaborators: Collaborators, config: PublisherConfig) -> Self {
        let tests = TestOrchestrator::new(
            collaborators.probe,
            config.test_suite.clone(),
            config.environment,
            config.retry.tests,
            config.timeouts.test_check,
        );
        Self {
            policy: collaborators.policy,
            registry: collaborators.registry,
            governance: collaborators.governance,
            store: collaborators.store,
            analytics: collaborators.analytics,
            validator: ServiceValidator::new(config.environment),
            openapi: OpenApiValidator::new(config.openapi_mode),
            tests,
            config,
            background: Mutex::new(Vec::new()),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    /// Waits for the lifecycle events and governance notifications sent so
    /// far. Short-lived callers await this before the runtime shuts down.
    pub async fn flush(&self) {
        let pending = std::mem::take(&mut *self.background.lock());
        for handle in pending {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background delivery task failed");
            }
        }
    }

    /// Publishes a new service under a freshly generated id.
    pub async fn publish(
        &self,
        provider_id: &str,
        spec: ServiceSpecification,
    ) -> Result<PublishOutcome> {
        self.publish_with_id(ServiceId::generate(), provider_id, spec)
            .await
    }

    /// Publishes under a caller-chosen id.
    ///
    /// Calling again with the id of an interrupted submission resumes it:
    /// the stored registry id and approval workflow are reused, so no
    /// duplicate registry entry or workflow is created. A submission that
    /// already settled returns its current status unchanged.
    pub async fn publish_with_id(
        &self,
        service_id: ServiceId,
        provider_id: &str,
        spec: ServiceSpecification,
    ) -> Result<PublishOutcome> {
        let mut ctx = PipelineContext::new(service_id, provider_id, spec);

        let resumed = match self.store.find_by_id(&service_id).await? {
            Some(existing) if existing.provider_id != provider_id => {
                return Err(PublishError::Authorization {
                    caller: provider_id.to_string(),
                    action: "publish",
                    service_id,
                });
            }
            Some(existing) if existing.status != ServiceStatus::PendingApproval => {
                info!(%service_id, status = %existing.status, "Submission already settled");
                return Ok(PublishOutcome::settled(&existing));
            }
            Some(existing) => {
                info!(%service_id, "Resuming interrupted submission");
                ctx.spec = existing.spec.clone();
                ctx.registry_id.clone_from(&existing.registry_id);
                ctx.approval_workflow_id
                    .clone_from(&existing.approval_workflow_id);
                ctx.persisted = true;
                Some(existing)
            }
            None => None,
        };

        if let Some(other) = self
            .store
            .find_by_name_and_version(&ctx.spec.name, &ctx.spec.version)
            .await?
        {
            if other.id != service_id {
                warn!(
                    %service_id,
                    name = %ctx.spec.name,
                    version = %ctx.spec.version,
                    existing = %other.id,
                    "Duplicate submission"
                );
                return Err(PublishError::Conflict {
                    name: ctx.spec.name.clone(),
                    version: ctx.spec.version.clone(),
                    existing: other.id,
                });
            }
        }

        info!(
            %service_id,
            provider_id,
            name = %ctx.spec.name,
            version = %ctx.spec.version,
            "Publishing service"
        );
        self.emit(
            self.event(&ctx, LifecycleEventType::Submitted)
                .with_metadata("name", ctx.spec.name.clone())
                .with_metadata("version", ctx.spec.version.clone()),
        );

        match self.run_pipeline(&mut ctx, resumed).await {
            Ok(service) => Ok(self.activated(&ctx, service).await),
            Err(Halt::Rejected(rejection)) => Ok(self.abandon(&ctx, rejection).await),
            Err(Halt::Failed(err)) => Err(self.abandon_failed(&ctx, err).await),
        }
    }

    async fn run_pipeline(
        &self,
        ctx: &mut PipelineContext,
        resumed: Option<Service>,
    ) -> std::result::Result<Service, Halt> {
        self.validate(ctx)?;
        self.check_policy(ctx).await?;
        self.register(ctx).await?;

        ctx.enter(Phase::Persist);
        let service = match resumed {
            Some(service) => service,
            None => {
                let record = Service::new(
                    ctx.service_id,
                    ctx.provider_id.clone(),
                    ctx.spec.clone(),
                    ctx.registry_id.clone(),
                );
                let stored = self.store.create(record).await?;
                ctx.persisted = true;
                info!(service_id = %ctx.service_id, "Service record created");
                stored
            }
        };

        if ctx.approval_workflow_id.is_none() {
            self.run_tests(ctx, &service).await?;
        }

        if service.spec.requires_approval() {
            self.await_approval(ctx, &service).await?;
        }

        ctx.enter(Phase::Activation);
        let active = self
            .store
            .update(
                &ctx.service_id,
                RecordUpdate::status(StatusChange::to(ServiceStatus::Active)),
            )
            .await?;
        Ok(active)
    }

    fn validate(&self, ctx: &mut PipelineContext) -> std::result::Result<(), Halt> {
        ctx.enter(Phase::Validation);
        let report = self.validator.validate(&ctx.spec);
        for warning in &report.warnings {
            info!(service_id = %ctx.service_id, warning = %warning, "Validation warning");
        }
        let failure = (!report.valid).then(|| report.summary());
        ctx.validation = Some(report);
        if let Some(summary) = failure {
            return Err(Rejection::validation(format!("validation failed: {summary}")).into());
        }

        if ctx.spec.openapi.is_some() {
            ctx.enter(Phase::InterfaceValidation);
        }
        if let Some(report) = ctx.spec.openapi.as_ref().map(|d| self.openapi.validate(d)) {
            let failure = (!report.valid).then(|| report.summary());
            ctx.interface_validation = Some(report);
            if let Some(summary) = failure {
                return Err(Rejection::validation(format!(
                    "openapi document invalid: {summary}"
                ))
                .into());
            }
        }
        Ok(())
    }

    async fn check_policy(&self, ctx: &mut PipelineContext) -> std::result::Result<(), Halt> {
        ctx.enter(Phase::Policy);
        let outcome = self
            .config
            .retry
            .policy
            .run("policy-check", self.config.timeouts.policy, || {
                self.policy.validate_service(&ctx.spec)
            })
            .await;

        match outcome {
            Ok((result, attempts)) => {
                ctx.record_attempts(Phase::Policy, attempts);
                let compliant = result.compliant;
                let violated = result.violated_policies();
                info!(
                    service_id = %ctx.service_id,
                    compliant,
                    violations = result.violations.len(),
                    policy_version = %result.policy_version,
                    "Policy check finished"
                );
                ctx.policy = Some(result);
                if !compliant {
                    return Err(Rejection::policy(format!("policy check failed: {violated}")).into());
                }
                Ok(())
            }
            Err(exhausted) => {
                ctx.record_attempts(Phase::Policy, exhausted.attempts);
                match self.config.policy_failure_mode {
                    PolicyFailureMode::FailOpen => {
                        warn!(
                            service_id = %ctx.service_id,
                            error = %exhausted.last_error,
                            "Policy engine unavailable, continuing without a policy check"
                        );
                        Ok(())
                    }
                    PolicyFailureMode::FailClosed => {
                        Err(dependency(ctx.service_id, "policy-engine", &exhausted).into())
                    }
                }
            }
        }
    }

    async fn register(&self, ctx: &mut PipelineContext) -> std::result::Result<(), Halt> {
        ctx.enter(Phase::Registration);
        if ctx.registry_id.is_some() {
            return Ok(());
        }

        let outcome = self
            .config
            .retry
            .registration
            .run("register-service", self.config.timeouts.registry, || {
                self.registry.register_service(&ctx.spec)
            })
            .await;

        match outcome {
            Ok((registry_id, attempts)) => {
                ctx.record_attempts(Phase::Registration, attempts);
                info!(
                    service_id = %ctx.service_id,
                    registry_id = %registry_id,
                    attempts,
                    "Service registered"
                );
                self.emit(
                    self.event(ctx, LifecycleEventType::Registered)
                        .with_metadata("registryId", registry_id.clone())
                        .with_metadata("attempts", attempts),
                );
                ctx.registry_id = Some(registry_id);
                Ok(())
            }
            Err(exhausted) => {
                ctx.record_attempts(Phase::Registration, exhausted.attempts);
                Err(dependency(ctx.service_id, "registry", &exhausted).into())
            }
        }
    }

    async fn run_tests(
        &self,
        ctx: &mut PipelineContext,
        service: &Service,
    ) -> std::result::Result<(), Halt> {
        ctx.enter(Phase::Testing);
        let result = self.tests.run_test_suite(service).await;
        let passed = result.overall_passed;
        let summary = result.summary();

        self.emit(
            self.event(ctx, LifecycleEventType::TestsCompleted)
                .with_metadata("passed", passed)
                .with_metadata("summary", summary.clone()),
        );
        ctx.test_suite = Some(result);

        if passed {
            Ok(())
        } else {
            Err(Rejection::tests(format!("test suite failed: {summary}")).into())
        }
    }

    async fn await_approval(
        &self,
        ctx: &mut PipelineContext,
        service: &Service,
    ) -> std::result::Result<(), Halt> {
        ctx.enter(Phase::Approval);
        let workflow_id = match ctx.approval_workflow_id.clone() {
            Some(workflow_id) => {
                info!(service_id = %ctx.service_id, %workflow_id, "Resuming approval wait");
                workflow_id
            }
            None => {
                let workflow_id = self.open_workflow(ctx, service).await?;
                self.store
                    .update(
                        &ctx.service_id,
                        RecordUpdate::approval_workflow(workflow_id.clone()),
                    )
                    .await?;
                self.emit(
                    self.event(ctx, LifecycleEventType::ApprovalRequested)
                        .with_metadata("workflowId", workflow_id.clone()),
                );
                ctx.approval_workflow_id = Some(workflow_id.clone());
                workflow_id
            }
        };

        let wait = self.config.approval_wait;
        let decision = self.wait_for_decision(ctx, &workflow_id, wait).await?;
        ctx.approval = Some(decision.clone());

        match decision {
            ApprovalDecision::Approved { reviewer } => {
                info!(
                    service_id = %ctx.service_id,
                    %workflow_id,
                    reviewer = reviewer.as_deref().unwrap_or("unknown"),
                    "Service approved"
                );
                Ok(())
            }
            ApprovalDecision::Rejected { reason } => {
                Err(Rejection::approval_rejected(reason).into())
            }
            ApprovalDecision::TimedOut => Err(Rejection::approval_timeout(wait).into()),
        }
    }

    /// Waits up to `wait` for a decision on `workflow_id`.
    ///
    /// Transient governance errors do not end the wait: the call is resumed
    /// with backoff until a decision arrives or the deadline passes.
    async fn wait_for_decision(
        &self,
        ctx: &PipelineContext,
        workflow_id: &str,
        wait: Duration,
    ) -> Result<ApprovalDecision> {
        let deadline = tokio::time::Instant::now() + wait;
        let retry = self.config.retry.governance;
        let mut failures = 0;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(ApprovalDecision::TimedOut);
            }

            let outcome = tokio::time::timeout(
                remaining,
                self.governance.wait_for_approval(workflow_id, remaining),
            )
            .await;
            match outcome {
                Ok(Ok(decision)) => return Ok(decision),
                Err(_) => return Ok(ApprovalDecision::TimedOut),
                Ok(Err(e)) if e.is_retryable() => {
                    failures += 1;
                    let delay = retry
                        .delay_for(failures)
                        .min(MAX_APPROVAL_RETRY_DELAY)
                        .min(remaining);
                    warn!(
                        service_id = %ctx.service_id,
                        workflow_id,
                        attempt = failures,
                        delay_ms = crate::config::millis(delay),
                        error = %e,
                        "Approval wait interrupted, resuming"
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(Err(e)) => {
                    return Err(PublishError::Dependency {
                        service_id: ctx.service_id,
                        dependency: "governance",
                        attempts: failures + 1,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    /// Returns the open workflow for this service, creating one if none is
    /// in flight.
    async fn open_workflow(&self, ctx: &mut PipelineContext, service: &Service) -> Result<String> {
        let retry = self.config.retry.governance;
        let timeout = self.config.timeouts.governance;

        let (in_flight, _) = retry
            .run("find-in-flight-workflow", timeout, || {
                self.governance.find_in_flight_workflow(&service.id)
            })
            .await
            .map_err(|e| dependency(service.id, "governance", &e))?;
        if let Some(workflow_id) = in_flight {
            info!(service_id = %service.id, %workflow_id, "Reusing in-flight approval workflow");
            return Ok(workflow_id);
        }

        let summary = ctx.test_suite.as_ref().map_or_else(
            || "tests completed in an earlier attempt".to_string(),
            crate::testing::TestSuiteResult::summary,
        );
        let request = ApprovalRequest::for_service(service, summary);
        let (workflow_id, attempts) = retry
            .run("create-approval-workflow", timeout, || {
                self.governance.create_approval_workflow(&request)
            })
            .await
            .map_err(|e| dependency(service.id, "governance", &e))?;
        ctx.record_attempts(Phase::Approval, attempts);
        info!(service_id = %service.id, %workflow_id, "Approval workflow created");
        Ok(workflow_id)
    }

    async fn activated(&self, ctx: &PipelineContext, service: Service) -> PublishOutcome {
        self.sync_status(&service).await;

        info!(
            service_id = %service.id,
            elapsed_ms = crate::config::millis(ctx.elapsed()),
            "Service is active"
        );
        self.emit(
            self.event(ctx, LifecycleEventType::Activated)
                .with_status(ServiceStatus::Active),
        );
        let outcome = PublishOutcome {
            service_id: service.id,
            status: service.status,
            message: format!(
                "service {}@{} is active",
                service.spec.name, service.spec.version
            ),
            kind: None,
        };
        self.notify(service, LifecycleEventType::Activated);
        outcome
    }

    /// Records the final status and reports the rejection. The registry
    /// entry is rolled back, or mirrored as suspended for approval outcomes.
    async fn abandon(&self, ctx: &PipelineContext, rejection: Rejection) -> PublishOutcome {
        info!(
            service_id = %ctx.service_id,
            phase = %ctx.phase(),
            status = %rejection.status,
            kind = %rejection.kind,
            message = %rejection.message,
            "Submission rejected"
        );

        let mut record = None;
        if ctx.persisted {
            let mut update = RecordUpdate::status(StatusChange::to(rejection.status));
            if rejection.status == ServiceStatus::Suspended {
                update = update.with_reason(rejection.message.clone());
            }
            match self.store.update(&ctx.service_id, update).await {
                Ok(service) => record = Some(service),
                Err(e) => error!(
                    service_id = %ctx.service_id,
                    error = %e,
                    "Failed to record final status"
                ),
            }
        }
        if rejection.rollback {
            if let Some(registry_id) = ctx.registry_id.as_deref() {
                self.rollback(ctx, registry_id).await;
            }
        } else if let Some(service) = &record {
            self.sync_status(service).await;
        }

        self.emit(
            self.event(ctx, rejection.event)
                .with_status(rejection.status)
                .with_metadata("kind", rejection.kind.as_str())
                .with_metadata("message", rejection.message.clone()),
        );
        self.notify(
            record.unwrap_or_else(|| ctx.snapshot(rejection.status)),
            rejection.event,
        );

        PublishOutcome {
            service_id: ctx.service_id,
            status: rejection.status,
            message: rejection.message,
            kind: Some(rejection.kind),
        }
    }

    /// Unwinds a submission that hit an error.
    ///
    /// Dependency and internal failures mark the record failed and roll back
    /// the registry entry. Other errors (a lost create race, a concurrent
    /// status change) leave both alone: the registry entry is shared with
    /// the record that won.
    async fn abandon_failed(&self, ctx: &PipelineContext, err: PublishError) -> PublishError {
        if !matches!(
            err,
            PublishError::Dependency { .. } | PublishError::Internal { .. }
        ) {
            warn!(
                service_id = %ctx.service_id,
                phase = %ctx.phase(),
                error = %err,
                "Submission aborted"
            );
            return err;
        }

        error!(
            service_id = %ctx.service_id,
            phase = %ctx.phase(),
            error = %err,
            "Submission failed"
        );
        let status = ServiceStatus::FailedValidation;
        let mut record = None;
        if ctx.persisted {
            match self
                .store
                .update(&ctx.service_id, RecordUpdate::status(StatusChange::to(status)))
                .await
            {
                Ok(service) => record = Some(service),
                Err(e) => error!(
                    service_id = %ctx.service_id,
                    error = %e,
                    "Failed to record final status"
                ),
            }
        }
        if let Some(registry_id) = ctx.registry_id.as_deref() {
            self.rollback(ctx, registry_id).await;
        }

        let mut event = self
            .event(ctx, LifecycleEventType::Failed)
            .with_metadata("kind", err.kind().as_str())
            .with_metadata("message", err.to_string());
        if ctx.persisted {
            event = event.with_status(status);
        }
        self.emit(event);
        self.notify(
            record.unwrap_or_else(|| ctx.snapshot(status)),
            LifecycleEventType::Failed,
        );
        err
    }

    /// Removes the registry entry. Failures are logged and swallowed.
    async fn rollback(&self, ctx: &PipelineContext, registry_id: &str) {
        let result = tokio::time::timeout(
            self.config.timeouts.registry,
            self.registry.rollback(&ctx.service_id, registry_id),
        )
        .await;

        match result {
            Ok(Ok(())) => {
                info!(service_id = %ctx.service_id, registry_id, "Registry entry rolled back");
                self.emit(
                    self.event(ctx, LifecycleEventType::RolledBack)
                        .with_metadata("registryId", registry_id),
                );
            }
            Ok(Err(e)) => error!(
                service_id = %ctx.service_id,
                registry_id,
                error = %e,
                "Registry rollback failed"
            ),
            Err(_) => error!(
                service_id = %ctx.service_id,
                registry_id,
                "Registry rollback timed out"
            ),
        }
    }

    /// Looks up a record.
    pub async fn get_service(&self, service_id: &ServiceId) -> Result<Service> {
        self.store
            .find_by_id(service_id)
            .await?
            .ok_or(PublishError::NotFound {
                service_id: *service_id,
            })
    }

    /// Searches records.
    pub async fn search(&self, filter: &SearchFilter) -> Result<SearchPage> {
        Ok(self.store.search(filter).await?)
    }

    /// Applies a field update.
    ///
    /// A patch that changes the version is checked against the current
    /// version and published as a new record; the current record is left
    /// untouched. Any other patch is validated, stored and mirrored to the
    /// registry.
    pub async fn update_service(
        &self,
        caller: &Caller,
        service_id: &ServiceId,
        patch: ServicePatch,
    ) -> Result<UpdateOutcome> {
        let current = self.authorized(caller, service_id, "update").await?;
        if current.status.is_terminal() {
            return Err(StatusError::Terminal {
                status: current.status,
            }
            .into());
        }
        let next = patch.apply_to(&current.spec);

        if patch.changes_version(&current.spec.version) {
            let report = self.validator.validate_version_change(
                &current.spec.version,
                &next.version,
                &current.spec.capabilities,
                &next.capabilities,
            );
            if !report.valid {
                return Err(PublishError::Validation {
                    message: report.summary(),
                });
            }
            for warning in &report.warnings {
                warn!(%service_id, warning = %warning, "Version change warning");
            }
            info!(
                %service_id,
                from = %current.spec.version,
                to = %next.version,
                "Publishing new version"
            );
            let outcome = self.publish(&current.provider_id, next).await?;
            return Ok(UpdateOutcome::Republished(outcome));
        }

        let report = self.validator.validate(&next);
        if !report.valid {
            return Err(PublishError::Validation {
                message: report.summary(),
            });
        }
        let updated = self.store.update(service_id, RecordUpdate::spec(next)).await?;

        if let Some(registry_id) = updated.registry_id.as_deref() {
            let outcome = self
                .config
                .retry
                .registration
                .run("update-service", self.config.timeouts.registry, || {
                    self.registry.update_service(registry_id, &updated.spec)
                })
                .await;
            if let Err(exhausted) = outcome {
                warn!(
                    %service_id,
                    registry_id,
                    attempts = exhausted.attempts,
                    error = %exhausted.last_error,
                    "Registry update failed"
                );
            }
        }

        info!(%service_id, caller = %caller.id, "Service updated");
        self.emit(
            LifecycleEvent::new(
                LifecycleEventType::Updated,
                updated.id,
                updated.provider_id.clone(),
            )
            .with_status(updated.status)
            .with_metadata("caller", caller.id.clone()),
        );
        Ok(UpdateOutcome::Updated(updated))
    }

    /// Moves an active service to `deprecated`.
    pub async fn deprecate(&self, caller: &Caller, service_id: &ServiceId) -> Result<Service> {
        self.transition(
            caller,
            service_id,
            Transition {
                action: "deprecate",
                change: StatusChange::to(ServiceStatus::Deprecated),
                requires: None,
                reason: None,
                event: LifecycleEventType::Deprecated,
            },
        )
        .await
    }

    /// Suspends a service.
    pub async fn suspend(
        &self,
        caller: &Caller,
        service_id: &ServiceId,
        reason: impl Into<String>,
    ) -> Result<Service> {
        self.transition(
            caller,
            service_id,
            Transition {
                action: "suspend",
                change: StatusChange::to(ServiceStatus::Suspended),
                requires: None,
                reason: Some(reason.into()),
                event: LifecycleEventType::Suspended,
            },
        )
        .await
    }

    /// Returns a suspended service to `active`. Administrators only.
    pub async fn reinstate(&self, caller: &Caller, service_id: &ServiceId) -> Result<Service> {
        if !caller.is_admin {
            return Err(PublishError::Authorization {
                caller: caller.id.clone(),
                action: "reinstate",
                service_id: *service_id,
            });
        }
        self.transition(
            caller,
            service_id,
            Transition {
                action: "reinstate",
                change: StatusChange::to(ServiceStatus::Active),
                requires: Some(ServiceStatus::Suspended),
                reason: None,
                event: LifecycleEventType::Reinstated,
            },
        )
        .await
    }

    /// Retires a service. Administrators may retire from any live status.
    pub async fn retire(&self, caller: &Caller, service_id: &ServiceId) -> Result<Service> {
        let change = if caller.is_admin {
            StatusChange::administrative(ServiceStatus::Retired)
        } else {
            StatusChange::to(ServiceStatus::Retired)
        };
        self.transition(
            caller,
            service_id,
            Transition {
                action: "retire",
                change,
                requires: None,
                reason: None,
                event: LifecycleEventType::Retired,
            },
        )
        .await
    }

    async fn transition(
        &self,
        caller: &Caller,
        service_id: &ServiceId,
        transition: Transition,
    ) -> Result<Service> {
        let current = self
            .authorized(caller, service_id, transition.action)
            .await?;
        if let Some(required) = transition.requires {
            if current.status != required {
                current.status.check_transition(transition.change)?;
                return Err(StatusError::IllegalTransition {
                    from: current.status,
                    to: transition.change.to,
                }
                .into());
            }
        }

        let mut update = RecordUpdate::status(transition.change);
        if let Some(reason) = transition.reason {
            update = update.with_reason(reason);
        }
        let service = self.store.update(service_id, update).await?;
        info!(
            %service_id,
            caller = %caller.id,
            from = %current.status,
            to = %service.status,
            "Service status changed"
        );

        self.sync_status(&service).await;
        self.emit(
            LifecycleEvent::new(transition.event, service.id, service.provider_id.clone())
                .with_status(service.status)
                .with_metadata("caller", caller.id.clone()),
        );
        self.notify(service.clone(), transition.event);
        Ok(service)
    }

    async fn authorized(
        &self,
        caller: &Caller,
        service_id: &ServiceId,
        action: &'static str,
    ) -> Result<Service> {
        let service = self.get_service(service_id).await?;
        if service.is_owned_by(caller) {
            Ok(service)
        } else {
            warn!(%service_id, caller = %caller.id, action, "Caller not authorized");
            Err(PublishError::Authorization {
                caller: caller.id.clone(),
                action,
                service_id: *service_id,
            })
        }
    }

    /// Mirrors the record's status onto its registry entry. Best effort.
    async fn sync_status(&self, service: &Service) {
        let Some(registry_id) = service.registry_id.as_deref() else {
            return;
        };
        let outcome = self
            .config
            .retry
            .registration
            .run("update-service-status", self.config.timeouts.registry, || {
                self.registry.update_service_status(registry_id, service.status)
            })
            .await;
        if let Err(exhausted) = outcome {
            warn!(
                service_id = %service.id,
                registry_id,
                status = %service.status,
                attempts = exhausted.attempts,
                error = %exhausted.last_error,
                "Registry status sync failed"
            );
        }
    }

    fn event(&self, ctx: &PipelineContext, event_type: LifecycleEventType) -> LifecycleEvent {
        LifecycleEvent::new(event_type, ctx.service_id, ctx.provider_id.clone())
            .with_metadata("phase", ctx.phase().as_str())
    }

    /// Sends an event to analytics without waiting for it.
    fn emit(&self, event: LifecycleEvent) {
        let sink = Arc::clone(&self.analytics);
        self.track(tokio::spawn(async move {
            let event_type = event.event_type;
            let service_id = event.service_id;
            if let Err(e) = sink.emit(event).await {
                warn!(%service_id, event = %event_type, error = %e, "Failed to emit lifecycle event");
            }
        }));
    }

    /// Notifies governance without waiting for it.
    fn notify(&self, service: Service, event: LifecycleEventType) {
        let governance = Arc::clone(&self.governance);
        let timeout = self.config.timeouts.governance;
        self.track(tokio::spawn(async move {
            match tokio::time::timeout(timeout, governance.notify(&service, event)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(
                    service_id = %service.id,
                    %event,
                    error = %e,
                    "Governance notification failed"
                ),
                Err(_) => warn!(
                    service_id = %service.id,
                    %event,
                    "Governance notification timed out"
                ),
            }
        }));
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut background = self.background.lock();
        background.retain(|task| !task.is_finished());
        background.push(handle);
    }
}
