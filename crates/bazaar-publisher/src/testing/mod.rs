//! Automated acceptance tests run against a registered service.
//!
//! Three categories run concurrently, each on its own copy of the record:
//!
//! - [`health`] - sequential sub-checks against the live endpoint
//! - [`security`] - structural scan of the declared configuration
//! - [`benchmark`] - latency, availability and throughput sampling
//!
//! Each category attempt is bounded by the test check timeout and retried on
//! probe infrastructure errors. A category that exhausts its attempts is
//! reported as failed; nothing here returns an error.

pub mod benchmark;
pub mod health;
mod report;
pub mod security;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bazaar_core::{Environment, Service};
use tracing::{info, warn};

use crate::config::TestSuiteConfig;
use crate::error::ProbeError;
use crate::probe::EndpointProbe;
use crate::retry::RetryPolicy;

pub use report::{
    BenchmarkMetric, BenchmarkReport, CheckStatus, HealthReport, SecurityFinding, SecurityReport,
    SubCheck, TestSuiteResult,
};

/// Runs the test suite.
#[derive(Clone)]
pub struct TestOrchestrator {
    probe: Arc<dyn EndpointProbe>,
    config: TestSuiteConfig,
    environment: Environment,
    retry: RetryPolicy,
    timeout: Duration,
}

impl std::fmt::Debug for TestOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestOrchestrator")
            .field("config", &self.config)
            .field("environment", &self.environment)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl TestOrchestrator {
    /// Creates an orchestrator.
    #[must_use]
    pub fn new(
        probe: Arc<dyn EndpointProbe>,
        config: TestSuiteConfig,
        environment: Environment,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            probe,
            config,
            environment,
            retry,
            timeout,
        }
    }

    /// Runs health, security and benchmark concurrently and joins the results.
    pub async fn run_test_suite(&self, service: &Service) -> TestSuiteResult {
        let probe = self.probe.as_ref();
        let config = &self.config;
        let environment = self.environment;

        let (health, security, benchmark) = futures::join!(
            self.guarded("health-check", service, HealthReport::errored, move |s| {
                health::run(probe, s, config)
            }),
            self.guarded("security-scan", service, SecurityReport::errored, move |s| {
                std::future::ready(Ok(security::scan(&s, environment)))
            }),
            self.guarded("benchmark", service, BenchmarkReport::errored, move |s| async move {
                Ok(benchmark::run(probe, s, config).await)
            }),
        );

        let result = TestSuiteResult::new(health, security, benchmark);
        info!(
            service_id = %service.id,
            health = result.test_result.passed,
            security = result.security_result.passed,
            benchmark = result.benchmark_result.passed,
            overall = result.overall_passed,
            "Test suite finished"
        );
        result
    }

    async fn guarded<R, F, Fut>(
        &self,
        name: &'static str,
        service: &Service,
        errored: fn(String) -> R,
        check: F,
    ) -> R
    where
        F: Fn(Service) -> Fut,
        Fut: Future<Output = Result<R, ProbeError>>,
    {
        let outcome = self
            .retry
            .run(name, self.timeout, || check(service.clone()))
            .await;

        match outcome {
            Ok((report, _)) => report,
            Err(exhausted) => {
                warn!(
                    service_id = %service.id,
                    check = name,
                    attempts = exhausted.attempts,
                    error = %exhausted.last_error,
                    "Test check failed to complete"
                );
                errored(format!("{name}: {}", exhausted.last_error))
            }
        }
    }
}
