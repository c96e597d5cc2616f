//! Test suite result types.

use serde::{Deserialize, Serialize};

use crate::policy::Severity;

/// Outcome of one health sub-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// The check passed.
    Passed,
    /// The check failed.
    Failed,
    /// The check did not apply or could not run.
    Skipped,
}

/// One health sub-check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubCheck {
    /// Sub-check name, e.g. `reachability`.
    pub name: String,
    /// Outcome.
    pub status: CheckStatus,
    /// Detail for operators.
    pub message: String,
}

impl SubCheck {
    /// A passing sub-check.
    pub fn passed(name: &str, message: impl Into<String>) -> Self {
        Self::with_status(name, CheckStatus::Passed, message)
    }

    /// A failing sub-check.
    pub fn failed(name: &str, message: impl Into<String>) -> Self {
        Self::with_status(name, CheckStatus::Failed, message)
    }

    /// A skipped sub-check.
    pub fn skipped(name: &str, message: impl Into<String>) -> Self {
        Self::with_status(name, CheckStatus::Skipped, message)
    }

    fn with_status(name: &str, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
        }
    }
}

/// Health check category result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Sub-checks in execution order.
    pub checks: Vec<SubCheck>,
    /// True when no sub-check failed.
    pub passed: bool,
    /// Set when the category could not run to completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthReport {
    /// Builds a report from sub-check outcomes.
    #[must_use]
    pub fn from_checks(checks: Vec<SubCheck>) -> Self {
        let passed = checks.iter().all(|c| c.status != CheckStatus::Failed);
        Self {
            checks,
            passed,
            error: None,
        }
    }

    /// A failed report for a category that exhausted its retries.
    #[must_use]
    pub const fn errored(error: String) -> Self {
        Self {
            checks: Vec::new(),
            passed: false,
            error: Some(error),
        }
    }

    /// Looks up a sub-check by name.
    #[must_use]
    pub fn check(&self, name: &str) -> Option<&SubCheck> {
        self.checks.iter().find(|c| c.name == name)
    }
}

/// One security scan finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityFinding {
    /// Rule that produced the finding.
    pub rule: String,
    /// Severity.
    pub severity: Severity,
    /// What was found.
    pub message: String,
}

/// Security scan category result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityReport {
    /// All findings.
    pub findings: Vec<SecurityFinding>,
    /// True when no finding is critical.
    pub passed: bool,
    /// Set when the category could not run to completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SecurityReport {
    /// Builds a report from findings.
    #[must_use]
    pub fn from_findings(findings: Vec<SecurityFinding>) -> Self {
        let passed = !findings.iter().any(|f| f.severity == Severity::Critical);
        Self {
            findings,
            passed,
            error: None,
        }
    }

    /// A failed report for a category that exhausted its retries.
    #[must_use]
    pub const fn errored(error: String) -> Self {
        Self {
            findings: Vec::new(),
            passed: false,
            error: Some(error),
        }
    }
}

/// One benchmark measurement against its threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkMetric {
    /// Metric name, e.g. `average-latency-ms`.
    pub name: String,
    /// Measured value.
    pub value: f64,
    /// Threshold the value is compared with.
    pub threshold: f64,
    /// Whether the value satisfies the threshold.
    pub passed: bool,
}

/// Performance benchmark category result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    /// Probes sent.
    pub samples: u32,
    /// Probes answered without a server error.
    pub successful: u32,
    /// Measurements.
    pub metrics: Vec<BenchmarkMetric>,
    /// True when every metric passed.
    pub passed: bool,
    /// Set when the category could not run to completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BenchmarkReport {
    /// Builds a report from measurements.
    #[must_use]
    pub fn from_metrics(samples: u32, successful: u32, metrics: Vec<BenchmarkMetric>) -> Self {
        let passed = metrics.iter().all(|m| m.passed);
        Self {
            samples,
            successful,
            metrics,
            passed,
            error: None,
        }
    }

    /// A failed report for a category that exhausted its retries.
    #[must_use]
    pub const fn errored(error: String) -> Self {
        Self {
            samples: 0,
            successful: 0,
            metrics: Vec::new(),
            passed: false,
            error: Some(error),
        }
    }

    /// Looks up a metric by name.
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<&BenchmarkMetric> {
        self.metrics.iter().find(|m| m.name == name)
    }
}

/// Combined result of the three test categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSuiteResult {
    /// Health checks.
    pub test_result: HealthReport,
    /// Security scan.
    pub security_result: SecurityReport,
    /// Performance benchmark.
    pub benchmark_result: BenchmarkReport,
    /// True when all three categories passed.
    pub overall_passed: bool,
}

impl TestSuiteResult {
    /// Combines category results.
    #[must_use]
    pub fn new(
        test_result: HealthReport,
        security_result: SecurityReport,
        benchmark_result: BenchmarkReport,
    ) -> Self {
        let overall_passed =
            test_result.passed && security_result.passed && benchmark_result.passed;
        Self {
            test_result,
            security_result,
            benchmark_result,
            overall_passed,
        }
    }

    /// Names of the categories that failed.
    #[must_use]
    pub fn failed_categories(&self) -> Vec<&'static str> {
        [
            ("health", self.test_result.passed),
            ("security", self.security_result.passed),
            ("benchmark", self.benchmark_result.passed),
        ]
        .into_iter()
        .filter_map(|(name, passed)| (!passed).then_some(name))
        .collect()
    }

    /// One-line summary for outcome messages and approval requests.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.overall_passed {
            return "all test categories passed".to_string();
        }
        let mut details = Vec::new();
        for check in &self.test_result.checks {
            if check.status == CheckStatus::Failed {
                details.push(format!("{}: {}", check.name, check.message));
            }
        }
        details.extend(
            self.security_result
                .findings
                .iter()
                .filter(|f| f.severity == Severity::Critical)
                .map(|f| format!("{}: {}", f.rule, f.message)),
        );
        details.extend(
            self.benchmark_result
                .metrics
                .iter()
                .filter(|m| !m.passed)
                .map(|m| format!("{} {:.2} vs {:.2}", m.name, m.value, m.threshold)),
        );
        for error in [
            &self.test_result.error,
            &self.security_result.error,
            &self.benchmark_result.error,
        ]
        .into_iter()
        .flatten()
        {
            details.push(error.clone());
        }

        format!(
            "failed categories: {} ({})",
            self.failed_categories().join(", "),
            details.join("; ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skipped_checks_do_not_fail_health() {
        let report = HealthReport::from_checks(vec![
            SubCheck::passed("reachability", "HTTP 200"),
            SubCheck::skipped("authentication", "no authentication declared"),
        ]);
        assert!(report.passed);
    }

    #[test]
    fn test_non_critical_findings_pass() {
        let report = SecurityReport::from_findings(vec![SecurityFinding {
            rule: "authentication".to_string(),
            severity: Severity::Medium,
            message: "no authentication".to_string(),
        }]);
        assert!(report.passed);
    }

    #[test]
    fn test_overall_is_conjunction() {
        let health = HealthReport::from_checks(vec![SubCheck::failed("reachability", "HTTP 503")]);
        let security = SecurityReport::from_findings(Vec::new());
        let benchmark = BenchmarkReport::from_metrics(10, 10, Vec::new());

        let result = TestSuiteResult::new(health, security, benchmark);
        assert!(!result.overall_passed);
        assert_eq!(result.failed_categories(), vec!["health"]);
        assert!(result.summary().contains("reachability: HTTP 503"));
    }

    #[test]
    fn test_errored_category_in_summary() {
        let result = TestSuiteResult::new(
            HealthReport::from_checks(Vec::new()),
            SecurityReport::from_findings(Vec::new()),
            BenchmarkReport::errored("benchmark timed out after 30s".to_string()),
        );
        assert_eq!(result.failed_categories(), vec!["benchmark"]);
        assert!(result.summary().contains("timed out"));
    }
}
