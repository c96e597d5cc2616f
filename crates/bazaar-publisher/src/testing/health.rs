//! Health checks against the live endpoint.
//!
//! Sub-checks run in order; when the endpoint is not reachable the rest are
//! skipped.

use std::time::Duration;

use bazaar_core::{AuthMode, Service};

use crate::config::TestSuiteConfig;
use crate::error::ProbeError;
use crate::probe::{join_path, EndpointProbe};
use crate::testing::report::{HealthReport, SubCheck};

/// Reachability sub-check.
pub const REACHABILITY: &str = "reachability";
/// Authentication handshake sub-check.
pub const AUTHENTICATION: &str = "authentication";
/// Baseline response shape sub-check.
pub const RESPONSE_SHAPE: &str = "response-shape";
/// Error handling sub-check.
pub const ERROR_HANDLING: &str = "error-handling";
/// Response time sub-check.
pub const RESPONSE_TIME: &str = "response-time";

/// Runs the health sub-checks.
///
/// # Errors
///
/// Probe infrastructure errors are returned so the caller can retry the
/// whole category.
pub async fn run(
    probe: &dyn EndpointProbe,
    service: Service,
    config: &TestSuiteConfig,
) -> Result<HealthReport, ProbeError> {
    let endpoint = &service.spec.endpoint;
    let mut checks = Vec::with_capacity(5);

    let baseline = probe.get(&endpoint.url).await?;
    if baseline.is_server_error() {
        checks.push(SubCheck::failed(
            REACHABILITY,
            format!("endpoint answered HTTP {}", baseline.status),
        ));
        for name in [AUTHENTICATION, RESPONSE_SHAPE, ERROR_HANDLING, RESPONSE_TIME] {
            checks.push(SubCheck::skipped(name, "endpoint not reachable"));
        }
        return Ok(HealthReport::from_checks(checks));
    }
    checks.push(SubCheck::passed(
        REACHABILITY,
        format!("HTTP {}", baseline.status),
    ));

    checks.push(if endpoint.auth_mode == AuthMode::None {
        SubCheck::skipped(AUTHENTICATION, "service declares no authentication")
    } else if baseline.is_auth_challenge() {
        SubCheck::passed(
            AUTHENTICATION,
            format!("unauthenticated request rejected with HTTP {}", baseline.status),
        )
    } else {
        SubCheck::failed(
            AUTHENTICATION,
            format!(
                "unauthenticated request answered HTTP {}, expected 401 or 403",
                baseline.status
            ),
        )
    });

    checks.push(if baseline.is_auth_challenge() {
        SubCheck::skipped(RESPONSE_SHAPE, "no credentials available")
    } else if baseline.is_success() && baseline.json_body {
        SubCheck::passed(RESPONSE_SHAPE, "JSON body")
    } else {
        SubCheck::failed(
            RESPONSE_SHAPE,
            format!(
                "expected a 2xx JSON response, got HTTP {}{}",
                baseline.status,
                if baseline.json_body { "" } else { " without a JSON body" }
            ),
        )
    });

    let missing = probe
        .get(&join_path(&endpoint.url, &config.missing_route))
        .await?;
    checks.push(if missing.is_client_error() {
        SubCheck::passed(
            ERROR_HANDLING,
            format!("unknown route answered HTTP {}", missing.status),
        )
    } else {
        SubCheck::failed(
            ERROR_HANDLING,
            format!("unknown route answered HTTP {}, expected 4xx", missing.status),
        )
    });

    let budget = Duration::from_millis(service.spec.sla.max_latency_ms);
    checks.push(if baseline.latency <= budget {
        SubCheck::passed(
            RESPONSE_TIME,
            format!("{}ms", baseline.latency.as_millis()),
        )
    } else {
        SubCheck::failed(
            RESPONSE_TIME,
            format!(
                "{}ms exceeds the {}ms SLA",
                baseline.latency.as_millis(),
                service.spec.sla.max_latency_ms
            ),
        )
    });

    Ok(HealthReport::from_checks(checks))
}
