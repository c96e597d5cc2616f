//! # Bazaar Core
//!
//! Core types and validators for the Bazaar service marketplace.
//!
//! This crate provides the data model shared by the publishing pipeline:
//!
//! - [`ServiceSpecification`] - Provider-submitted service description
//! - [`Service`] - Durable service record and its [`ServiceStatus`] state machine
//! - [`ServiceValidator`] - Structural and business-rule validation
//! - [`OpenApiValidator`] - OpenAPI 3.1 document validation
//! - [`SemanticVersion`] - Semver parsing and precedence
//!
//! ## Example
//!
//! ```rust
//! use bazaar_core::{ServiceStatus, StatusChange};
//!
//! let status = ServiceStatus::PendingApproval;
//! assert!(status.check_transition(StatusChange::to(ServiceStatus::Active)).is_ok());
//! assert!(ServiceStatus::Retired
//!     .check_transition(StatusChange::to(ServiceStatus::Active))
//!     .is_err());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod openapi;
pub mod service;
pub mod spec;
pub mod validation;
pub mod validator;
pub mod version;

#[cfg(test)]
mod proptest_tests;

pub use error::{Error, Result, StatusError};
pub use openapi::{OpenApiMode, OpenApiValidator};
pub use service::{Caller, Service, ServiceId, ServicePatch, ServiceStatus, StatusChange};
pub use spec::{
    AuthMode, ComplianceDescriptor, ComplianceLevel, EndpointDescriptor, PricingDescriptor,
    PricingModel, PricingTier, Protocol, ServiceCategory, ServiceSpecification, SlaDescriptor,
    SupportLevel,
};
pub use validation::{Validate, ValidationError, ValidationErrors, ValidationReport};
pub use validator::{Environment, ServiceValidator};
pub use version::SemanticVersion;
