//! Performance benchmark.

use std::time::Duration;

use bazaar_core::Service;
use tokio::time::Instant;
use tracing::debug;

use crate::config::TestSuiteConfig;
use crate::probe::EndpointProbe;
use crate::testing::report::{BenchmarkMetric, BenchmarkReport};

/// Average latency metric.
pub const AVERAGE_LATENCY: &str = "average-latency-ms";
/// Availability metric.
pub const AVAILABILITY: &str = "availability-pct";
/// Throughput metric, only for high-throughput categories.
pub const THROUGHPUT: &str = "throughput-rps";

/// Probes the endpoint `sample_iterations` times in sequence and compares
/// the measurements with the service SLA.
///
/// Failed probes count against availability.
pub async fn run(
    probe: &dyn EndpointProbe,
    service: Service,
    config: &TestSuiteConfig,
) -> BenchmarkReport {
    let spec = &service.spec;
    let samples = config.sample_iterations.max(1);
    let started = Instant::now();
    let mut successful = 0u32;
    let mut latency = Duration::ZERO;

    for sample in 0..samples {
        match probe.get(&spec.endpoint.url).await {
            Ok(response) if !response.is_server_error() => {
                successful += 1;
                latency += response.latency;
            }
            Ok(response) => debug!(sample, status = response.status, "Benchmark sample failed"),
            Err(e) => debug!(sample, error = %e, "Benchmark sample failed"),
        }
    }
    let elapsed = started.elapsed().max(Duration::from_millis(1));

    let average_ms = if successful == 0 {
        f64::INFINITY
    } else {
        latency.as_secs_f64() * 1000.0 / f64::from(successful)
    };
    #[allow(clippy::cast_precision_loss)]
    let max_latency = spec.sla.max_latency_ms as f64;
    let availability = f64::from(successful) / f64::from(samples) * 100.0;

    let mut metrics = vec![
        BenchmarkMetric {
            name: AVERAGE_LATENCY.to_string(),
            value: average_ms,
            threshold: max_latency,
            passed: average_ms <= max_latency,
        },
        BenchmarkMetric {
            name: AVAILABILITY.to_string(),
            value: availability,
            threshold: spec.sla.availability,
            passed: availability >= spec.sla.availability,
        },
    ];
    if spec.category.is_high_throughput() {
        let throughput = f64::from(successful) / elapsed.as_secs_f64();
        metrics.push(BenchmarkMetric {
            name: THROUGHPUT.to_string(),
            value: throughput,
            threshold: config.min_throughput_rps,
            passed: throughput >= config.min_throughput_rps,
        });
    }

    BenchmarkReport::from_metrics(samples, successful, metrics)
}
