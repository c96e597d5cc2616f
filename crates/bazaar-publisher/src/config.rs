//! Publisher configuration.
//!
//! Every struct has a [`Default`] matching production settings and loads
//! from YAML or JSON. Durations are written in milliseconds.

use std::path::Path;
use std::time::Duration;

use bazaar_core::{Environment, OpenApiMode};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::retry::{RetryPolicy, DEFAULT_BASE_DELAY};

/// Default policy engine call budget.
pub const DEFAULT_POLICY_TIMEOUT: Duration = Duration::from_millis(100);

/// Default registry and governance call budget.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Default budget for one test check attempt.
pub const DEFAULT_TEST_CHECK_TIMEOUT: Duration = Duration::from_secs(30);

/// Default upper bound on waiting for an approval decision.
pub const DEFAULT_APPROVAL_WAIT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// What the pipeline does when the policy engine cannot answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyFailureMode {
    /// Proceed as if compliant, logging a warning.
    FailOpen,
    /// Abort the submission with a dependency failure.
    #[default]
    FailClosed,
}

/// Attempt budgets per step class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryConfig {
    /// Policy compliance check.
    pub policy: RetryPolicy,
    /// Registry registration and record-level registry sync.
    pub registration: RetryPolicy,
    /// Each automated test check.
    pub tests: RetryPolicy,
    /// Governance workflow calls.
    pub governance: RetryPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            policy: RetryPolicy::new(3, DEFAULT_BASE_DELAY),
            registration: RetryPolicy::new(5, DEFAULT_BASE_DELAY),
            tests: RetryPolicy::new(2, DEFAULT_BASE_DELAY),
            governance: RetryPolicy::new(3, DEFAULT_BASE_DELAY),
        }
    }
}

impl RetryConfig {
    /// Replaces the base delay of every step class.
    #[must_use]
    pub const fn with_base_delay(self, base_delay: Duration) -> Self {
        Self {
            policy: self.policy.with_base_delay(base_delay),
            registration: self.registration.with_base_delay(base_delay),
            tests: self.tests.with_base_delay(base_delay),
            governance: self.governance.with_base_delay(base_delay),
        }
    }
}

/// Per-call timeouts for external collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimeoutConfig {
    /// Policy engine call.
    #[serde(with = "duration_ms", rename = "policyMs")]
    pub policy: Duration,
    /// Registry call.
    #[serde(with = "duration_ms", rename = "registryMs")]
    pub registry: Duration,
    /// Governance call (not the approval wait).
    #[serde(with = "duration_ms", rename = "governanceMs")]
    pub governance: Duration,
    /// One attempt of one test check.
    #[serde(with = "duration_ms", rename = "testCheckMs")]
    pub test_check: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            policy: DEFAULT_POLICY_TIMEOUT,
            registry: DEFAULT_CALL_TIMEOUT,
            governance: DEFAULT_CALL_TIMEOUT,
            test_check: DEFAULT_TEST_CHECK_TIMEOUT,
        }
    }
}

/// Automated test suite settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TestSuiteConfig {
    /// Sequential probes taken by the benchmark.
    pub sample_iterations: u32,
    /// Minimum throughput for high-throughput categories.
    pub min_throughput_rps: f64,
    /// Path appended to the endpoint URL to exercise error handling.
    pub missing_route: String,
}

impl Default for TestSuiteConfig {
    fn default() -> Self {
        Self {
            sample_iterations: 10,
            min_throughput_rps: 5.0,
            missing_route: "/__bazaar_probe_missing".to_string(),
        }
    }
}

/// Top-level publisher configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PublisherConfig {
    /// Environment the pipeline validates for.
    pub environment: Environment,
    /// Policy engine outage handling.
    pub policy_failure_mode: PolicyFailureMode,
    /// How attached OpenAPI documents are checked.
    pub openapi_mode: OpenApiMode,
    /// Attempt budgets.
    pub retry: RetryConfig,
    /// Call timeouts.
    pub timeouts: TimeoutConfig,
    /// Upper bound on waiting for an approval decision.
    #[serde(with = "duration_ms", rename = "approvalWaitMs")]
    pub approval_wait: Duration,
    /// Test suite settings.
    pub test_suite: TestSuiteConfig,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            policy_failure_mode: PolicyFailureMode::default(),
            openapi_mode: OpenApiMode::default(),
            retry: RetryConfig::default(),
            timeouts: TimeoutConfig::default(),
            approval_wait: DEFAULT_APPROVAL_WAIT,
            test_suite: TestSuiteConfig::default(),
        }
    }
}

impl PublisherConfig {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> PublisherConfigBuilder {
        PublisherConfigBuilder::default()
    }

    /// Parses a YAML (or JSON) configuration document.
    ///
    /// Missing keys take their default values.
    pub fn from_yaml_str(input: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(input).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    /// Loads a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_yaml_str(&text)
    }
}

/// Builder for [`PublisherConfig`].
#[derive(Debug, Default)]
pub struct PublisherConfigBuilder {
    environment: Option<Environment>,
    policy_failure_mode: Option<PolicyFailureMode>,
    openapi_mode: Option<OpenApiMode>,
    retry: Option<RetryConfig>,
    timeouts: Option<TimeoutConfig>,
    approval_wait: Option<Duration>,
    test_suite: Option<TestSuiteConfig>,
}

impl PublisherConfigBuilder {
    /// Sets the environment.
    #[must_use]
    pub const fn environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Sets the policy engine outage handling.
    #[must_use]
    pub const fn policy_failure_mode(mut self, mode: PolicyFailureMode) -> Self {
        self.policy_failure_mode = Some(mode);
        self
    }

    /// Sets the OpenAPI validation mode.
    #[must_use]
    pub const fn openapi_mode(mut self, mode: OpenApiMode) -> Self {
        self.openapi_mode = Some(mode);
        self
    }

    /// Sets attempt budgets.
    #[must_use]
    pub const fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Sets call timeouts.
    #[must_use]
    pub const fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Sets the approval wait bound.
    #[must_use]
    pub const fn approval_wait(mut self, wait: Duration) -> Self {
        self.approval_wait = Some(wait);
        self
    }

    /// Sets the test suite settings.
    #[must_use]
    pub fn test_suite(mut self, test_suite: TestSuiteConfig) -> Self {
        self.test_suite = Some(test_suite);
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> PublisherConfig {
        let defaults = PublisherConfig::default();
        PublisherConfig {
            environment: self.environment.unwrap_or(defaults.environment),
            policy_failure_mode: self
                .policy_failure_mode
                .unwrap_or(defaults.policy_failure_mode),
            openapi_mode: self.openapi_mode.unwrap_or(defaults.openapi_mode),
            retry: self.retry.unwrap_or(defaults.retry),
            timeouts: self.timeouts.unwrap_or(defaults.timeouts),
            approval_wait: self.approval_wait.unwrap_or(defaults.approval_wait),
            test_suite: self.test_suite.unwrap_or(defaults.test_suite),
        }
    }
}

/// Whole milliseconds, saturating.
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Serde adapter storing a [`Duration`] as integer milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(super::millis(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
