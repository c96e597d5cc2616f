//! Bazaar Publishing Pipeline
//!
//! This crate turns a provider's [`ServiceSpecification`](bazaar_core::ServiceSpecification)
//! into a live marketplace listing.
//!
//! # Overview
//!
//! The [`Publisher`] runs each submission through:
//! - **Validation**: structural rules and the optional OpenAPI document
//! - **Policy**: compliance check against a [`PolicyEngine`]
//! - **Registration**: idempotent catalog entry, with rollback on failure
//! - **Testing**: concurrent health, security and benchmark checks
//! - **Approval**: governance workflow for confidential, restricted and enterprise services
//! - **Activation**: status change plus analytics and governance notifications
//!
//! External calls are bounded by timeouts and retried with exponential
//! backoff ([`RetryPolicy`]).
//!
//! # Architecture
//!
//! ```text
//!   provider ──► Publisher ──► PolicyEngine
//!                   │  │  └──► Registry ◄── rollback
//!                   │  └─────► TestOrchestrator ──► EndpointProbe
//!                   ├────────► Governance (approval, notify)
//!                   ├────────► ServiceStore
//!                   └────────► AnalyticsSink
//! ```
//!
//! # Example
//!
//! ```rust
//! use bazaar_publisher::RetryPolicy;
//! use std::time::Duration;
//!
//! let retry = RetryPolicy::new(5, Duration::from_secs(1));
//! assert_eq!(retry.delay_for(1), Duration::from_secs(1));
//! assert_eq!(retry.delay_for(3), Duration::from_secs(4));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::unused_async)]

pub mod config;
pub mod context;
pub mod error;
pub mod governance;
pub mod policy;
pub mod probe;
pub mod publisher;
pub mod retry;
pub mod store;
pub mod testing;

pub use config::{
    PolicyFailureMode, PublisherConfig, PublisherConfigBuilder, RetryConfig, TestSuiteConfig,
    TimeoutConfig,
};
pub use context::{Phase, PipelineContext};
pub use error::{
    ConfigError, FailureKind, GovernanceError, PolicyEngineError, ProbeError, PublishError,
    Result, StoreError, Transient,
};
pub use governance::{
    ApprovalDecision, ApprovalRequest, Governance, GovernanceCall, HttpGovernanceClient,
    StaticDecision, StaticGovernance,
};
pub use policy::{
    HttpPolicyEngine, PolicyEngine, PolicyResult, PolicyRules, PolicyViolation, RulePolicyEngine,
    Severity,
};
pub use probe::{EndpointProbe, HttpProbe, ProbeResponse};
pub use publisher::{Collaborators, PublishOutcome, Publisher, UpdateOutcome};
pub use retry::{Exhausted, RetryPolicy};
pub use store::{InMemoryServiceStore, RecordUpdate, SearchFilter, SearchPage, ServiceStore};
pub use testing::{TestOrchestrator, TestSuiteResult};
