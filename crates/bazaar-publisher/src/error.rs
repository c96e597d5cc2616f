//! Error types for the publishing pipeline and its collaborators.

use std::fmt;
use std::time::Duration;

use bazaar_core::{ServiceId, StatusError};
use bazaar_registry::RegistryError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for publisher operations.
pub type Result<T> = std::result::Result<T, PublishError>;

/// Failure taxonomy shared by outcomes and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Structural or interface-document validation failed.
    ValidationFailure,
    /// The policy engine found a critical violation.
    PolicyViolation,
    /// A downstream dependency stayed unavailable after retries.
    DependencyFailure,
    /// The automated acceptance tests failed.
    TestSuiteFailure,
    /// A reviewer rejected the approval workflow.
    ApprovalRejected,
    /// The approval wait elapsed without a decision.
    ApprovalTimeout,
    /// Another live record holds the same `(name, version)`.
    Conflict,
    /// The referenced record does not exist.
    NotFound,
    /// The caller may not act on the record.
    AuthorizationFailure,
    /// The state machine rejected the requested status change.
    IllegalTransition,
    /// Unexpected internal fault.
    Internal,
}

impl FailureKind {
    /// Returns the stable string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationFailure => "validation_failure",
            Self::PolicyViolation => "policy_violation",
            Self::DependencyFailure => "dependency_failure",
            Self::TestSuiteFailure => "test_suite_failure",
            Self::ApprovalRejected => "approval_rejected",
            Self::ApprovalTimeout => "approval_timeout",
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::AuthorizationFailure => "authorization_failure",
            Self::IllegalTransition => "illegal_transition",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned to callers of the [`Publisher`](crate::Publisher).
///
/// Expected pipeline outcomes (validation failure, suspension, ...) are
/// reported through [`PublishOutcome`](crate::PublishOutcome) instead.
#[derive(Error, Debug)]
pub enum PublishError {
    /// Another live record holds the same `(name, version)`.
    #[error("service {name}@{version} already exists as {existing}")]
    Conflict {
        /// Service name.
        name: String,
        /// Service version.
        version: String,
        /// Identifier of the existing record.
        existing: ServiceId,
    },

    /// No record with this identifier.
    #[error("service not found: {service_id}")]
    NotFound {
        /// Requested identifier.
        service_id: ServiceId,
    },

    /// The caller is neither the provider of record nor an administrator.
    #[error("caller '{caller}' may not {action} service {service_id}")]
    Authorization {
        /// Caller identifier.
        caller: String,
        /// Attempted action.
        action: &'static str,
        /// Target record.
        service_id: ServiceId,
    },

    /// A dependency stayed unavailable after all attempts.
    #[error("{dependency} unavailable after {attempts} attempt(s) for service {service_id}: {message}")]
    Dependency {
        /// Submission that was abandoned. Its record, if one was persisted,
        /// is left as `failed_validation`.
        service_id: ServiceId,
        /// Which collaborator failed.
        dependency: &'static str,
        /// Attempts made.
        attempts: u32,
        /// Last error seen.
        message: String,
    },

    /// A record-level edit produced an invalid specification.
    #[error("invalid update: {message}")]
    Validation {
        /// Summary of the validation errors.
        message: String,
    },

    /// The state machine rejected a status change.
    #[error(transparent)]
    Status(#[from] StatusError),

    /// Unexpected internal fault.
    #[error("internal error: {message}")]
    Internal {
        /// Error description.
        message: String,
    },
}

impl PublishError {
    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns the taxonomy kind of this error.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Conflict { .. } => FailureKind::Conflict,
            Self::NotFound { .. } => FailureKind::NotFound,
            Self::Authorization { .. } => FailureKind::AuthorizationFailure,
            Self::Dependency { .. } => FailureKind::DependencyFailure,
            Self::Validation { .. } => FailureKind::ValidationFailure,
            Self::Status(_) => FailureKind::IllegalTransition,
            Self::Internal { .. } => FailureKind::Internal,
        }
    }

    /// Returns true if the caller may retry the same request later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Dependency { .. })
    }

    /// The service the error concerns, when there is one.
    #[must_use]
    pub const fn service_id(&self) -> Option<ServiceId> {
        match self {
            Self::Conflict { existing, .. } => Some(*existing),
            Self::NotFound { service_id }
            | Self::Authorization { service_id, .. }
            | Self::Dependency { service_id, .. } => Some(*service_id),
            Self::Validation { .. } | Self::Status(_) | Self::Internal { .. } => None,
        }
    }
}

impl From<StoreError> for PublishError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict {
                name,
                version,
                existing,
            } => Self::Conflict {
                name,
                version,
                existing,
            },
            StoreError::NotFound { service_id } => Self::NotFound { service_id },
            StoreError::Status(e) => Self::Status(e),
            StoreError::Backend { message } => Self::Internal { message },
        }
    }
}

/// Errors from a [`ServiceStore`](crate::ServiceStore).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A live record already holds this `(name, version)`.
    #[error("service {name}@{version} already exists as {existing}")]
    Conflict {
        /// Service name.
        name: String,
        /// Service version.
        version: String,
        /// Identifier of the existing record.
        existing: ServiceId,
    },

    /// No record with this identifier.
    #[error("service not found: {service_id}")]
    NotFound {
        /// Requested identifier.
        service_id: ServiceId,
    },

    /// The update requested an illegal status change.
    #[error(transparent)]
    Status(#[from] StatusError),

    /// Storage backend failure.
    #[error("storage backend error: {message}")]
    Backend {
        /// Error description.
        message: String,
    },
}

/// Errors from a [`PolicyEngine`](crate::PolicyEngine).
#[derive(Error, Debug)]
pub enum PolicyEngineError {
    /// The engine could not be reached.
    #[error("policy engine unreachable: {message}")]
    Unavailable {
        /// Error description.
        message: String,
    },

    /// The engine did not answer in time.
    #[error("policy engine timed out after {after:?}")]
    Timeout {
        /// Elapsed budget.
        after: Duration,
    },

    /// The engine answered with an error status.
    #[error("policy engine returned HTTP {status}: {message}")]
    HttpError {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// The engine answered with an unreadable body.
    #[error("invalid policy engine response: {message}")]
    InvalidResponse {
        /// Error description.
        message: String,
    },
}

impl PolicyEngineError {
    /// Returns true if the call may succeed when repeated.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable { .. } | Self::Timeout { .. } => true,
            Self::HttpError { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidResponse { .. } => false,
        }
    }
}

impl From<reqwest::Error> for PolicyEngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidResponse {
                message: err.to_string(),
            }
        } else {
            Self::Unavailable {
                message: err.to_string(),
            }
        }
    }
}

/// Errors from a [`Governance`](crate::Governance) collaborator.
#[derive(Error, Debug)]
pub enum GovernanceError {
    /// The governance service could not be reached.
    #[error("governance unreachable: {message}")]
    Unavailable {
        /// Error description.
        message: String,
    },

    /// The call did not complete in time.
    #[error("governance call timed out after {after:?}")]
    Timeout {
        /// Elapsed budget.
        after: Duration,
    },

    /// The workflow does not exist.
    #[error("approval workflow not found: {workflow_id}")]
    WorkflowNotFound {
        /// Requested workflow.
        workflow_id: String,
    },

    /// The service answered with an error status.
    #[error("governance returned HTTP {status}: {message}")]
    HttpError {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// The service answered with an unreadable body.
    #[error("invalid governance response: {message}")]
    InvalidResponse {
        /// Error description.
        message: String,
    },
}

impl GovernanceError {
    /// Returns true if the call may succeed when repeated.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable { .. } | Self::Timeout { .. } => true,
            Self::HttpError { status, .. } => *status == 429 || *status >= 500,
            Self::WorkflowNotFound { .. } | Self::InvalidResponse { .. } => false,
        }
    }
}

impl From<reqwest::Error> for GovernanceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidResponse {
                message: err.to_string(),
            }
        } else {
            Self::Unavailable {
                message: err.to_string(),
            }
        }
    }
}

/// Errors from an [`EndpointProbe`](crate::EndpointProbe).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The endpoint URL could not be used.
    #[error("invalid probe url '{url}'")]
    InvalidUrl {
        /// Offending URL.
        url: String,
    },

    /// Connection could not be established.
    #[error("could not reach {url}: {message}")]
    Connect {
        /// Target URL.
        url: String,
        /// Error description.
        message: String,
    },

    /// The probe or the whole check exceeded its budget.
    #[error("{target} timed out after {after:?}")]
    Timeout {
        /// What timed out (URL or check name).
        target: String,
        /// Elapsed budget.
        after: Duration,
    },
}

impl ProbeError {
    /// Returns true if the probe may succeed when repeated.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::Timeout { .. })
    }
}

/// Errors raised while loading a [`PublisherConfig`](crate::PublisherConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not a valid configuration document.
    #[error("failed to parse config: {reason}")]
    Parse {
        /// Parser message.
        reason: String,
    },
}

/// Collaborator errors that the retry loop knows how to classify.
pub trait Transient: fmt::Display {
    /// Returns true if the operation may succeed when repeated.
    fn is_transient(&self) -> bool;

    /// Builds the error reported when one attempt exceeds its timeout.
    fn timed_out(operation: &'static str, after: Duration) -> Self;
}

impl Transient for RegistryError {
    fn is_transient(&self) -> bool {
        self.is_retryable()
    }

    fn timed_out(operation: &'static str, _after: Duration) -> Self {
        Self::Timeout {
            url: operation.to_string(),
        }
    }
}

impl Transient for PolicyEngineError {
    fn is_transient(&self) -> bool {
        self.is_retryable()
    }

    fn timed_out(_operation: &'static str, after: Duration) -> Self {
        Self::Timeout { after }
    }
}

impl Transient for GovernanceError {
    fn is_transient(&self) -> bool {
        self.is_retryable()
    }

    fn timed_out(_operation: &'static str, after: Duration) -> Self {
        Self::Timeout { after }
    }
}

impl Transient for ProbeError {
    fn is_transient(&self) -> bool {
        self.is_retryable()
    }

    fn timed_out(operation: &'static str, after: Duration) -> Self {
        Self::Timeout {
            target: operation.to_string(),
            after,
        }
    }
}
