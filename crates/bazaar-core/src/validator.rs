//! Structural and business-rule validation of service specifications.
//!
//! The [`ServiceValidator`] is pure: it makes no external calls and the same
//! input always yields the same report.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::spec::ServiceSpecification;
use crate::validation::{Validate, ValidationError, ValidationErrors, ValidationReport};
use crate::version::SemanticVersion;

const NAME_MIN: usize = 3;
const NAME_MAX: usize = 64;
const DESCRIPTION_MIN: usize = 10;
const DESCRIPTION_MAX: usize = 2000;
const MAX_TAGS: usize = 20;

/// Deployment environment the platform runs in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Production: encrypted transport is mandatory.
    #[default]
    Production,
    /// Pre-production.
    Staging,
    /// Local development.
    Development,
}

impl Environment {
    /// Returns true in production.
    #[must_use]
    pub const fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Staging => write!(f, "staging"),
            Self::Development => write!(f, "development"),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "staging" => Ok(Self::Staging),
            "development" | "dev" => Ok(Self::Development),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

/// Validates service specifications.
///
/// # Examples
///
/// ```
/// use bazaar_core::{Environment, ServiceSpecification, ServiceValidator};
///
/// let validator = ServiceValidator::new(Environment::Development);
/// let spec = ServiceSpecification::from_yaml_str(r"
/// name: echo
/// version: not-a-version
/// description: Echoes requests back
/// category: other
/// capabilities: [echo]
/// endpoint: { url: 'http://localhost:8080' }
/// pricing: { model: free }
/// sla: { availability: 99.0, maxLatencyMs: 100, supportLevel: basic }
/// compliance: { level: public }
/// ").unwrap();
///
/// let report = validator.validate(&spec);
/// assert!(!report.valid);
/// assert!(report.errors.has_field("version"));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceValidator {
    environment: Environment,
}

impl ServiceValidator {
    /// Creates a validator for the given environment.
    #[must_use]
    pub const fn new(environment: Environment) -> Self {
        Self { environment }
    }

    /// Returns the environment this validator enforces.
    #[must_use]
    pub const fn environment(&self) -> Environment {
        self.environment
    }

    /// Validates a specification.
    #[must_use]
    pub fn validate(&self, spec: &ServiceSpecification) -> ValidationReport {
        let mut errors = ValidationErrors::new();
        let mut warnings = Vec::new();

        Self::check_name(&spec.name, &mut errors);

        if spec.version.trim().is_empty() {
            errors.add(ValidationError::required("version"));
        } else if let Ok(version) = SemanticVersion::parse(&spec.version) {
            if version.is_pre_release() {
                warnings.push(format!("version {version} is a pre-release"));
            }
        } else {
            errors.add(ValidationError::format(
                "version",
                format!("'{}' is not a valid semantic version", spec.version),
            ));
        }

        let description = spec.description.trim();
        if description.is_empty() {
            errors.add(ValidationError::required("description"));
        } else if !(DESCRIPTION_MIN..=DESCRIPTION_MAX).contains(&description.chars().count()) {
            errors.add(ValidationError::range(
                "description",
                format!("must be between {DESCRIPTION_MIN} and {DESCRIPTION_MAX} characters"),
            ));
        }

        if !spec.category.is_recognized() {
            errors.add(ValidationError::format(
                "category",
                format!("'{}' is not a recognized category", spec.category),
            ));
        }

        if spec.tags.len() > MAX_TAGS {
            errors.add(ValidationError::range(
                "tags",
                format!("at most {MAX_TAGS} tags are allowed"),
            ));
        }
        if spec.tags.iter().any(|t| t.trim().is_empty()) {
            errors.add(ValidationError::format("tags", "tags must not be blank"));
        }

        if spec.capabilities.is_empty() {
            errors.add(ValidationError::empty("capabilities"));
        } else {
            let mut seen = HashSet::new();
            for capability in &spec.capabilities {
                if capability.trim().is_empty() {
                    errors.add(ValidationError::format(
                        "capabilities",
                        "capabilities must not be blank",
                    ));
                } else if !seen.insert(capability.as_str()) {
                    errors.add(ValidationError::constraint(
                        "capabilities",
                        format!("capability '{capability}' is declared more than once"),
                    ));
                }
            }
        }

        self.check_endpoint(spec, &mut errors);

        errors.merge_prefixed("pricing", spec.pricing.validate());
        errors.merge_prefixed("sla", spec.sla.validate());

        for (i, country) in spec.compliance.data_residency.iter().enumerate() {
            if !(country.len() == 2 && country.chars().all(|c| c.is_ascii_uppercase())) {
                errors.add(ValidationError::format(
                    format!("compliance.dataResidency[{i}]"),
                    format!("'{country}' is not an ISO 3166 alpha-2 country code"),
                ));
            }
        }

        ValidationReport::new(errors, warnings)
    }

    /// Validates moving a published service from `old_version` to `new_version`.
    ///
    /// The new version must be strictly greater. Removing capabilities is a
    /// breaking change; without a major bump it is reported as a warning.
    #[must_use]
    pub fn validate_version_update(&self, old_version: &str, new_version: &str) -> ValidationReport {
        self.validate_version_change(old_version, new_version, &[], &[])
    }

    /// Like [`validate_version_update`](Self::validate_version_update), with the
    /// capability lists of both versions for breaking-change detection.
    #[must_use]
    pub fn validate_version_change(
        &self,
        old_version: &str,
        new_version: &str,
        old_capabilities: &[String],
        new_capabilities: &[String],
    ) -> ValidationReport {
        let mut errors = ValidationErrors::new();
        let mut warnings = Vec::new();

        let old = SemanticVersion::parse(old_version);
        let new = SemanticVersion::parse(new_version);

        if old.is_err() {
            errors.add(ValidationError::format(
                "oldVersion",
                format!("'{old_version}' is not a valid semantic version"),
            ));
        }
        if new.is_err() {
            errors.add(ValidationError::format(
                "version",
                format!("'{new_version}' is not a valid semantic version"),
            ));
        }

        if let (Ok(old), Ok(new)) = (old, new) {
            if new <= old {
                errors.add(ValidationError::constraint(
                    "version",
                    format!("new version {new} must be greater than {old}"),
                ));
            } else {
                let removed: Vec<&String> = old_capabilities
                    .iter()
                    .filter(|c| !new_capabilities.contains(c))
                    .collect();
                if !removed.is_empty() {
                    let list = removed
                        .iter()
                        .map(|c| c.as_str())
                        .collect::<Vec<_>>()
                        .join(", ");
                    if old.is_major_bump_to(&new) {
                        warnings.push(format!(
                            "major version bump removes capabilities: {list}"
                        ));
                    } else {
                        warnings.push(format!(
                            "capabilities removed without a major version bump: {list}"
                        ));
                    }
                }
            }
        }

        ValidationReport::new(errors, warnings)
    }

    fn check_name(name: &str, errors: &mut ValidationErrors) {
        if name.trim().is_empty() {
            errors.add(ValidationError::required("name"));
            return;
        }
        if !(NAME_MIN..=NAME_MAX).contains(&name.len()) {
            errors.add(ValidationError::range(
                "name",
                format!("must be between {NAME_MIN} and {NAME_MAX} characters"),
            ));
        }
        let starts_with_letter = name.chars().next().is_some_and(|c| c.is_ascii_lowercase());
        let allowed = name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !starts_with_letter || !allowed {
            errors.add(ValidationError::format(
                "name",
                "must start with a lowercase letter and contain only lowercase letters, digits and '-'",
            ));
        }
    }

    fn check_endpoint(&self, spec: &ServiceSpecification, errors: &mut ValidationErrors) {
        let raw = spec.endpoint.url.trim();
        if raw.is_empty() {
            errors.add(ValidationError::required("endpoint.url"));
            return;
        }

        match url::Url::parse(raw) {
            Ok(url) => {
                if !matches!(url.scheme(), "http" | "https" | "ws" | "wss" | "grpc" | "grpcs") {
                    errors.add(ValidationError::format(
                        "endpoint.url",
                        format!("unsupported scheme '{}'", url.scheme()),
                    ));
                } else if !url.host_str().is_some_and(|h| !h.is_empty()) {
                    errors.add(ValidationError::format("endpoint.url", "URL has no host"));
                } else if self.environment.is_production()
                    && !matches!(url.scheme(), "https" | "wss" | "grpcs")
                {
                    errors.add(ValidationError::constraint(
                        "endpoint.url",
                        "production endpoints must use an encrypted transport",
                    ));
                }
            }
            Err(e) => errors.add(ValidationError::format(
                "endpoint.url",
                format!("'{raw}' is not a valid URL: {e}"),
            )),
        }
    }
}
