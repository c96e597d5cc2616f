//! Approval workflows and governance dashboard notifications.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bazaar_audit::LifecycleEventType;
use bazaar_core::{ComplianceLevel, Service, ServiceId, ServiceStatus, SupportLevel};
use parking_lot::Mutex;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use url::Url;

use crate::error::GovernanceError;

/// Default interval between workflow status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// What a reviewer is asked to approve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    /// Service under review.
    pub service_id: ServiceId,
    /// Submitting provider.
    pub provider_id: String,
    /// Service name.
    pub name: String,
    /// Service version.
    pub version: String,
    /// Data classification that triggered the review.
    pub compliance_level: ComplianceLevel,
    /// Support tier.
    pub support_level: SupportLevel,
    /// One-line summary of the automated test results.
    pub test_summary: String,
}

impl ApprovalRequest {
    /// Builds the request for `service`.
    pub fn for_service(service: &Service, test_summary: impl Into<String>) -> Self {
        Self {
            service_id: service.id,
            provider_id: service.provider_id.clone(),
            name: service.spec.name.clone(),
            version: service.spec.version.clone(),
            compliance_level: service.spec.compliance.level,
            support_level: service.spec.sla.support_level,
            test_summary: test_summary.into(),
        }
    }
}

/// Final state of an approval workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ApprovalDecision {
    /// A reviewer approved.
    Approved {
        /// Reviewer identity, if reported.
        #[serde(default)]
        reviewer: Option<String>,
    },
    /// A reviewer rejected.
    Rejected {
        /// Rejection reason, if given.
        #[serde(default)]
        reason: Option<String>,
    },
    /// No decision within the wait bound.
    TimedOut,
}

impl ApprovalDecision {
    /// Returns true for [`ApprovalDecision::Approved`].
    #[must_use]
    pub const fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }
}

/// Governance collaborator.
#[async_trait]
pub trait Governance: Send + Sync {
    /// Returns the open workflow for `service_id`, if one exists.
    async fn find_in_flight_workflow(
        &self,
        service_id: &ServiceId,
    ) -> Result<Option<String>, GovernanceError>;

    /// Opens an approval workflow and returns its id.
    async fn create_approval_workflow(
        &self,
        request: &ApprovalRequest,
    ) -> Result<String, GovernanceError>;

    /// Waits up to `timeout` for a decision on `workflow_id`.
    ///
    /// Returns [`ApprovalDecision::TimedOut`] once the deadline passes.
    /// Pollers keep going through retryable errors.
    async fn wait_for_approval(
        &self,
        workflow_id: &str,
        timeout: Duration,
    ) -> Result<ApprovalDecision, GovernanceError>;

    /// Reports a lifecycle event to the governance dashboard.
    async fn notify(&self, service: &Service, event: LifecycleEventType)
        -> Result<(), GovernanceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum WorkflowState {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkflowView {
    id: String,
    state: WorkflowState,
    #[serde(default)]
    reviewer: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorkflowList {
    #[serde(default)]
    workflows: Vec<WorkflowView>,
}

#[derive(Debug, Deserialize)]
struct CreatedWorkflow {
    id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Notification<'a> {
    service_id: ServiceId,
    provider_id: &'a str,
    name: &'a str,
    version: &'a str,
    status: ServiceStatus,
    event: LifecycleEventType,
}

/// [`Governance`] backed by the governance service's HTTP API.
///
/// | Operation | Request |
/// |---|---|
/// | find in-flight | `GET /v1/workflows?serviceId=...&state=pending` |
/// | create | `POST /v1/workflows` |
/// | wait | `GET /v1/workflows/{id}`, polled |
/// | notify | `POST /v1/notifications` |
#[derive(Debug)]
pub struct HttpGovernanceClient {
    base: Url,
    token: Option<String>,
    poll_interval: Duration,
    http: reqwest::Client,
}

impl HttpGovernanceClient {
    /// Creates a client for the governance service at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GovernanceError> {
        let base = Url::parse(base_url)
            .ok()
            .filter(|u| !u.cannot_be_a_base())
            .ok_or_else(|| GovernanceError::InvalidResponse {
                message: format!("invalid governance url '{base_url}'"),
            })?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bazaar-publisher/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base,
            token: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            http,
        })
    }

    /// Sends `token` as a bearer credential.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the workflow poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(response: Response) -> Result<Response, GovernanceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(GovernanceError::HttpError {
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        })
    }

    async fn fetch_workflow(&self, workflow_id: &str) -> Result<WorkflowView, GovernanceError> {
        let response = self
            .authorized(self.http.get(self.endpoint(&["v1", "workflows", workflow_id])))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(GovernanceError::WorkflowNotFound {
                workflow_id: workflow_id.to_string(),
            });
        }
        Ok(Self::check(response).await?.json().await?)
    }
}

#[async_trait]
impl Governance for HttpGovernanceClient {
    async fn find_in_flight_workflow(
        &self,
        service_id: &ServiceId,
    ) -> Result<Option<String>, GovernanceError> {
        let mut url = self.endpoint(&["v1", "workflows"]);
        url.query_pairs_mut()
            .append_pair("serviceId", &service_id.to_string())
            .append_pair("state", "pending");

        let response = self.authorized(self.http.get(url)).send().await?;
        let list: WorkflowList = Self::check(response).await?.json().await?;
        Ok(list
            .workflows
            .into_iter()
            .find(|w| w.state == WorkflowState::Pending)
            .map(|w| w.id))
    }

    async fn create_approval_workflow(
        &self,
        request: &ApprovalRequest,
    ) -> Result<String, GovernanceError> {
        let response = self
            .authorized(self.http.post(self.endpoint(&["v1", "workflows"])))
            .json(request)
            .send()
            .await?;
        let created: CreatedWorkflow = Self::check(response).await?.json().await?;
        Ok(created.id)
    }

    async fn wait_for_approval(
        &self,
        workflow_id: &str,
        timeout: Duration,
    ) -> Result<ApprovalDecision, GovernanceError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.fetch_workflow(workflow_id).await {
                Ok(view) => {
                    tracing::debug!(workflow_id = %view.id, state = ?view.state, "Polled approval workflow");
                    match view.state {
                        WorkflowState::Approved => {
                            return Ok(ApprovalDecision::Approved {
                                reviewer: view.reviewer,
                            })
                        }
                        WorkflowState::Rejected => {
                            return Ok(ApprovalDecision::Rejected {
                                reason: view.reason,
                            })
                        }
                        WorkflowState::Pending => {}
                    }
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(workflow_id, error = %e, "Approval poll failed, will poll again");
                }
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(ApprovalDecision::TimedOut);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn notify(
        &self,
        service: &Service,
        event: LifecycleEventType,
    ) -> Result<(), GovernanceError> {
        let response = self
            .authorized(self.http.post(self.endpoint(&["v1", "notifications"])))
            .json(&Notification {
                service_id: service.id,
                provider_id: &service.provider_id,
                name: &service.spec.name,
                version: &service.spec.version,
                status: service.status,
                event,
            })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

/// A call received by [`StaticGovernance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GovernanceCall {
    /// `find_in_flight_workflow`.
    FindInFlight(ServiceId),
    /// `create_approval_workflow`.
    Create(ServiceId),
    /// `wait_for_approval`.
    Wait(String),
    /// `notify`.
    Notify(ServiceId, LifecycleEventType),
}

/// Decision returned by [`StaticGovernance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaticDecision {
    /// Approve immediately.
    Approve,
    /// Reject immediately with the given reason.
    Reject(String),
    /// Never decide; waits run out their timeout.
    Pending,
}

#[derive(Debug, Default)]
struct StaticState {
    calls: Vec<GovernanceCall>,
    in_flight: HashMap<ServiceId, String>,
    created: u32,
}

/// In-process [`Governance`] with a fixed decision and a call log.
#[derive(Debug)]
pub struct StaticGovernance {
    decision: StaticDecision,
    state: Mutex<StaticState>,
}

impl StaticGovernance {
    /// Creates a governance stand-in returning `decision`.
    #[must_use]
    pub fn new(decision: StaticDecision) -> Self {
        Self {
            decision,
            state: Mutex::new(StaticState::default()),
        }
    }

    /// Approves every workflow.
    #[must_use]
    pub fn approving() -> Self {
        Self::new(StaticDecision::Approve)
    }

    /// Rejects every workflow with `reason`.
    #[must_use]
    pub fn rejecting(reason: impl Into<String>) -> Self {
        Self::new(StaticDecision::Reject(reason.into()))
    }

    /// Never decides.
    #[must_use]
    pub fn undecided() -> Self {
        Self::new(StaticDecision::Pending)
    }

    /// Seeds an open workflow for `service_id`.
    #[must_use]
    pub fn with_in_flight(self, service_id: ServiceId, workflow_id: impl Into<String>) -> Self {
        self.state.lock().in_flight.insert(service_id, workflow_id.into());
        self
    }

    /// All calls received, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<GovernanceCall> {
        self.state.lock().calls.clone()
    }

    /// Number of workflows created.
    #[must_use]
    pub fn created_count(&self) -> u32 {
        self.state.lock().created
    }

    /// Lifecycle events notified for `service_id`.
    #[must_use]
    pub fn notifications(&self, service_id: &ServiceId) -> Vec<LifecycleEventType> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                GovernanceCall::Notify(id, event) if id == service_id => Some(*event),
                _ => None,
            })
            .collect()
    }
}

impl Default for StaticGovernance {
    fn default() -> Self {
        Self::approving()
    }
}

#[async_trait]
impl Governance for StaticGovernance {
    async fn find_in_flight_workflow(
        &self,
        service_id: &ServiceId,
    ) -> Result<Option<String>, GovernanceError> {
        let mut state = self.state.lock();
        state.calls.push(GovernanceCall::FindInFlight(*service_id));
        Ok(state.in_flight.get(service_id).cloned())
    }

    async fn create_approval_workflow(
        &self,
        request: &ApprovalRequest,
    ) -> Result<String, GovernanceError> {
        let mut state = self.state.lock();
        state.calls.push(GovernanceCall::Create(request.service_id));
        state.created += 1;
        let workflow_id = format!("wf-{}", state.created);
        state.in_flight.insert(request.service_id, workflow_id.clone());
        Ok(workflow_id)
    }

    async fn wait_for_approval(
        &self,
        workflow_id: &str,
        timeout: Duration,
    ) -> Result<ApprovalDecision, GovernanceError> {
        {
            let mut state = self.state.lock();
            state.calls.push(GovernanceCall::Wait(workflow_id.to_string()));
            if self.decision != StaticDecision::Pending {
                state.in_flight.retain(|_, id| id != workflow_id);
            }
        }

        match &self.decision {
            StaticDecision::Approve => Ok(ApprovalDecision::Approved {
                reviewer: Some("static-reviewer".to_string()),
            }),
            StaticDecision::Reject(reason) => Ok(ApprovalDecision::Rejected {
                reason: Some(reason.clone()),
            }),
            StaticDecision::Pending => {
                tokio::time::sleep(timeout).await;
                Ok(ApprovalDecision::TimedOut)
            }
        }
    }

    async fn notify(
        &self,
        service: &Service,
        event: LifecycleEventType,
    ) -> Result<(), GovernanceError> {
        self.state
            .lock()
            .calls
            .push(GovernanceCall::Notify(service.id, event));
        Ok(())
    }
}
