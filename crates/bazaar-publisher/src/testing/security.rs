//! Structural security scan.

use bazaar_core::{AuthMode, ComplianceLevel, Environment, Service};

use crate::policy::Severity;
use crate::testing::report::{SecurityFinding, SecurityReport};

fn finding(rule: &str, severity: Severity, message: impl Into<String>) -> SecurityFinding {
    SecurityFinding {
        rule: rule.to_string(),
        severity,
        message: message.into(),
    }
}

/// Scans the declared configuration of `service`. No requests are made.
#[must_use]
pub fn scan(service: &Service, environment: Environment) -> SecurityReport {
    let spec = &service.spec;
    let encrypted = spec.endpoint.uses_encrypted_transport();
    let mut findings = Vec::new();

    if environment.is_production() && !encrypted {
        findings.push(finding(
            "encrypted-transport",
            Severity::Critical,
            format!("production endpoint {} is not encrypted", spec.endpoint.url),
        ));
    }
    if matches!(
        spec.compliance.level,
        ComplianceLevel::Confidential | ComplianceLevel::Restricted
    ) && spec.compliance.certifications.is_empty()
    {
        findings.push(finding(
            "certifications",
            Severity::Critical,
            format!(
                "{} services must list at least one certification",
                spec.compliance.level
            ),
        ));
    }
    if spec.endpoint.auth_mode == AuthMode::None {
        findings.push(finding(
            "authentication",
            Severity::Medium,
            "endpoint accepts unauthenticated requests",
        ));
    }
    if spec.compliance.level == ComplianceLevel::Restricted
        && spec.compliance.data_residency.is_empty()
    {
        findings.push(finding(
            "data-residency",
            Severity::High,
            "restricted services should declare data residency",
        ));
    }
    if !environment.is_production() && !encrypted {
        let lower = spec.endpoint.url.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("ws://") {
            findings.push(finding(
                "plaintext-transport",
                Severity::Low,
                format!("endpoint {} uses plaintext transport", spec.endpoint.url),
            ));
        }
    }

    SecurityReport::from_findings(findings)
}
