//! Policy compliance checks.
//!
//! [`HttpPolicyEngine`] calls the platform policy service; [`RulePolicyEngine`]
//! evaluates the built-in rule families in process.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bazaar_core::{
    AuthMode, ComplianceDescriptor, ComplianceLevel, ServiceSpecification, SlaDescriptor,
};
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::PolicyEngineError;

/// Violation severity. Any [`Severity::Critical`] finding makes a service
/// non-compliant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational.
    Low,
    /// Should be fixed.
    Medium,
    /// Must be fixed soon.
    High,
    /// Blocks publication.
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// One failed policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyViolation {
    /// Policy identifier, e.g. `data-residency`.
    pub policy: String,
    /// How serious the violation is.
    pub severity: Severity,
    /// What is wrong.
    pub message: String,
    /// How to fix it.
    #[serde(default)]
    pub remediation: Option<String>,
}

impl PolicyViolation {
    /// Creates a violation without remediation advice.
    pub fn new(policy: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            policy: policy.into(),
            severity,
            message: message.into(),
            remediation: None,
        }
    }

    /// Adds remediation advice.
    #[must_use]
    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }
}

/// Result of a policy evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyResult {
    /// False when any violation is critical.
    pub compliant: bool,
    /// All violations found.
    #[serde(default)]
    pub violations: Vec<PolicyViolation>,
    /// Version of the policy bundle evaluated.
    pub policy_version: String,
    /// Evaluation time.
    pub validated_at: DateTime<Utc>,
}

impl PolicyResult {
    /// Builds a result, deriving compliance from the violations.
    #[must_use]
    pub fn from_violations(policy_version: impl Into<String>, violations: Vec<PolicyViolation>) -> Self {
        let compliant = !violations.iter().any(|v| v.severity == Severity::Critical);
        Self {
            compliant,
            violations,
            policy_version: policy_version.into(),
            validated_at: Utc::now(),
        }
    }

    /// Critical violations only.
    pub fn critical(&self) -> impl Iterator<Item = &PolicyViolation> {
        self.violations
            .iter()
            .filter(|v| v.severity == Severity::Critical)
    }

    /// Critical violations as `policy: message`, joined with `; `.
    #[must_use]
    pub fn violated_policies(&self) -> String {
        self.critical()
            .map(|v| format!("{}: {}", v.policy, v.message))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn enforce_critical(mut self) -> Self {
        if self.critical().next().is_some() {
            self.compliant = false;
        }
        self
    }
}

/// Compliance checker consulted before registration.
#[async_trait]
pub trait PolicyEngine: Send + Sync {
    /// Evaluates the compliance-relevant fields of `spec`.
    async fn validate_service(
        &self,
        spec: &ServiceSpecification,
    ) -> Result<PolicyResult, PolicyEngineError>;
}

/// Built-in policy rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PolicyRules {
    /// Version string reported on results.
    pub policy_version: String,
    /// Country codes data may not reside in.
    pub restricted_regions: Vec<String>,
    /// Certifications required for confidential and restricted services.
    pub required_certifications: Vec<String>,
    /// Reject endpoints without encrypted transport.
    pub require_encrypted_transport: bool,
    /// Availability below this is a medium violation.
    pub availability_warning: f64,
    /// Availability below this is a high violation.
    pub availability_minimum: f64,
}

impl Default for PolicyRules {
    fn default() -> Self {
        Self {
            policy_version: "builtin-1".to_string(),
            restricted_regions: ["CN", "RU", "KP", "IR", "SY", "CU"]
                .into_iter()
                .map(String::from)
                .collect(),
            required_certifications: vec!["SOC2".to_string()],
            require_encrypted_transport: true,
            availability_warning: 99.0,
            availability_minimum: 95.0,
        }
    }
}

/// In-process [`PolicyEngine`] evaluating [`PolicyRules`].
#[derive(Debug, Clone, Default)]
pub struct RulePolicyEngine {
    rules: PolicyRules,
}

impl RulePolicyEngine {
    /// Creates an engine with the given rules.
    #[must_use]
    pub const fn new(rules: PolicyRules) -> Self {
        Self { rules }
    }

    /// Returns the active rules.
    #[must_use]
    pub const fn rules(&self) -> &PolicyRules {
        &self.rules
    }

    /// Evaluates `spec` synchronously.
    #[must_use]
    pub fn evaluate(&self, spec: &ServiceSpecification) -> PolicyResult {
        let mut violations = Vec::new();
        self.check_residency(&spec.compliance, &mut violations);
        self.check_certifications(&spec.compliance, &mut violations);
        if self.rules.require_encrypted_transport && !spec.endpoint.uses_encrypted_transport() {
            violations.push(
                PolicyViolation::new(
                    "transport-security",
                    Severity::Critical,
                    format!("endpoint {} does not use encrypted transport", spec.endpoint.url),
                )
                .with_remediation("serve the endpoint over https or wss"),
            );
        }
        self.check_sla(&spec.sla, &mut violations);

        PolicyResult::from_violations(self.rules.policy_version.clone(), violations)
    }

    fn check_residency(&self, compliance: &ComplianceDescriptor, out: &mut Vec<PolicyViolation>) {
        for region in &compliance.data_residency {
            if self
                .rules
                .restricted_regions
                .iter()
                .any(|r| r.eq_ignore_ascii_case(region))
            {
                out.push(
                    PolicyViolation::new(
                        "data-residency",
                        Severity::Critical,
                        format!("data residency in restricted region {region}"),
                    )
                    .with_remediation("host data in a permitted region"),
                );
            }
        }
    }

    fn check_certifications(
        &self,
        compliance: &ComplianceDescriptor,
        out: &mut Vec<PolicyViolation>,
    ) {
        let severity = match compliance.level {
            ComplianceLevel::Confidential => Severity::High,
            ComplianceLevel::Restricted => Severity::Critical,
            ComplianceLevel::Public | ComplianceLevel::Internal => return,
        };
        for required in &self.rules.required_certifications {
            let held = compliance
                .certifications
                .iter()
                .any(|c| c.eq_ignore_ascii_case(required));
            if !held {
                out.push(
                    PolicyViolation::new(
                        "required-certifications",
                        severity,
                        format!(
                            "{} services must hold the {required} certification",
                            compliance.level.as_str()
                        ),
                    )
                    .with_remediation(format!("obtain {required} and list it under compliance.certifications")),
                );
            }
        }
    }

    fn check_sla(&self, sla: &SlaDescriptor, out: &mut Vec<PolicyViolation>) {
        let severity = if sla.availability < self.rules.availability_minimum {
            Severity::High
        } else if sla.availability < self.rules.availability_warning {
            Severity::Medium
        } else {
            return;
        };
        out.push(PolicyViolation::new(
            "minimum-sla",
            severity,
            format!("availability target {}% is below the platform minimum", sla.availability),
        ));
    }
}

#[async_trait]
impl PolicyEngine for RulePolicyEngine {
    async fn validate_service(
        &self,
        spec: &ServiceSpecification,
    ) -> Result<PolicyResult, PolicyEngineError> {
        Ok(self.evaluate(spec))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PolicyRequest<'a> {
    name: &'a str,
    version: &'a str,
    endpoint_url: &'a str,
    auth_mode: AuthMode,
    compliance: &'a ComplianceDescriptor,
    sla: &'a SlaDescriptor,
}

/// [`PolicyEngine`] backed by the policy service's HTTP API
/// (`POST {base}/v1/policies/validate`).
#[derive(Debug)]
pub struct HttpPolicyEngine {
    url: Url,
    token: Option<String>,
    timeout: Duration,
    http: reqwest::Client,
}

impl HttpPolicyEngine {
    /// Creates a client for the policy service at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, PolicyEngineError> {
        let invalid = || PolicyEngineError::InvalidResponse {
            message: format!("invalid policy engine url '{base_url}'"),
        };
        let mut url = Url::parse(base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|()| invalid())?
            .pop_if_empty()
            .extend(["v1", "policies", "validate"]);

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bazaar-publisher/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            url,
            token: None,
            timeout,
            http,
        })
    }

    /// Sends `token` as a bearer credential.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// The validation endpoint.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl PolicyEngine for HttpPolicyEngine {
    async fn validate_service(
        &self,
        spec: &ServiceSpecification,
    ) -> Result<PolicyResult, PolicyEngineError> {
        let mut request = self.http.post(self.url.clone()).json(&PolicyRequest {
            name: &spec.name,
            version: &spec.version,
            endpoint_url: &spec.endpoint.url,
            auth_mode: spec.endpoint.auth_mode,
            compliance: &spec.compliance,
            sla: &spec.sla,
        });
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                PolicyEngineError::Timeout {
                    after: self.timeout,
                }
            } else {
                e.into()
            }
        })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(PolicyEngineError::HttpError {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let result: PolicyResult = response.json().await?;
        Ok(result.enforce_critical())
    }
}
