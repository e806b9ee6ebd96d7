use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::info;

use loadbench_core::{BenchError, BenchResult, RequestMetric};

const LABELS: [&str; 2] = ["service", "benchmark_id"];

/// Latency buckets in seconds, 1 ms to 10 s.
const DURATION_BUCKETS: [f64; 8] = [0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0];

/// Prometheus rendering of recorded request metrics.
///
/// Counters and the duration histogram are labeled by service and
/// benchmark id so runs can be compared on one dashboard. Built after
/// the fact from stored metrics; the JSON artifact is the primary
/// output and this surface is optional.
pub struct MetricsExposition {
    registry: Registry,
    requests_total: IntCounterVec,
    requests_successful: IntCounterVec,
    requests_failed: IntCounterVec,
    duration_seconds: HistogramVec,
}

impl MetricsExposition {
    pub fn new() -> BenchResult<Self> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("benchmark_requests_total", "Requests issued"),
            &LABELS,
        )
        .map_err(prom_err)?;
        let requests_successful = IntCounterVec::new(
            Opts::new(
                "benchmark_requests_successful",
                "Requests that succeeded",
            ),
            &LABELS,
        )
        .map_err(prom_err)?;
        let requests_failed = IntCounterVec::new(
            Opts::new("benchmark_requests_failed", "Requests that failed"),
            &LABELS,
        )
        .map_err(prom_err)?;
        let duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "benchmark_request_duration_seconds",
                "Request duration in seconds",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &LABELS,
        )
        .map_err(prom_err)?;

        registry
            .register(Box::new(requests_total.clone()))
            .map_err(prom_err)?;
        registry
            .register(Box::new(requests_successful.clone()))
            .map_err(prom_err)?;
        registry
            .register(Box::new(requests_failed.clone()))
            .map_err(prom_err)?;
        registry
            .register(Box::new(duration_seconds.clone()))
            .map_err(prom_err)?;

        Ok(Self {
            registry,
            requests_total,
            requests_successful,
            requests_failed,
            duration_seconds,
        })
    }

    /// Folds one recorded metric into the registry.
    pub fn record(&self, metric: &RequestMetric) {
        let benchmark_id = metric.benchmark_id.to_string();
        let labels = [metric.service_name.as_str(), benchmark_id.as_str()];

        self.requests_total.with_label_values(&labels).inc();
        if metric.success {
            self.requests_successful.with_label_values(&labels).inc();
        } else {
            self.requests_failed.with_label_values(&labels).inc();
        }
        if let Some(duration) = metric.duration_secs {
            self.duration_seconds
                .with_label_values(&labels)
                .observe(duration);
        }
    }

    /// Folds a whole run into the registry.
    pub fn record_all(&self, metrics: &[RequestMetric]) {
        for metric in metrics {
            self.record(metric);
        }
    }

    /// Renders the registry in the text exposition format.
    pub fn encode(&self) -> BenchResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(prom_err)?;
        String::from_utf8(buffer)
            .map_err(|err| BenchError::Serialization(err.to_string()))
    }

    /// Pushes the rendered registry to a Pushgateway-style endpoint.
    pub async fn push(&self, endpoint: &str) -> BenchResult<()> {
        let body = self.encode()?;
        let response = reqwest::Client::new()
            .post(endpoint)
            .header("Content-Type", "text/plain; version=0.0.4")
            .body(body)
            .send()
            .await
            .map_err(|err| BenchError::connection(err.to_string()))?;

        if !response.status().is_success() {
            return Err(BenchError::protocol(format!(
                "metrics push to {endpoint} returned {}",
                response.status()
            )));
        }
        info!(endpoint, "pushed metrics");
        Ok(())
    }
}

fn prom_err(err: prometheus::Error) -> BenchError {
    BenchError::Serialization(err.to_string())
}

#[cfg(test)]
mod tests {
    use loadbench_core::{BenchmarkId, ErrorClass};

    use super::*;

    #[test]
    fn exposition_carries_counters_and_histogram() {
        let id = BenchmarkId::new();
        let exposition = MetricsExposition::new().unwrap();
        exposition.record_all(&[
            RequestMetric::success(id, "ollama", 0, 0.0, 0.05, Some("200".into())),
            RequestMetric::success(id, "ollama", 1, 0.1, 0.8, Some("200".into())),
            RequestMetric::failure(
                id,
                "ollama",
                0,
                0.2,
                None,
                None,
                ErrorClass::Connection,
            ),
        ]);

        let text = exposition.encode().unwrap();
        assert!(text.contains(&format!(
            "benchmark_requests_total{{benchmark_id=\"{id}\",service=\"ollama\"}} 3"
        )));
        assert!(text.contains(&format!(
            "benchmark_requests_failed{{benchmark_id=\"{id}\",service=\"ollama\"}} 1"
        )));
        assert!(text.contains(&format!(
            "benchmark_requests_successful{{benchmark_id=\"{id}\",service=\"ollama\"}} 2"
        )));
        assert!(!text.contains("benchmark_requests_successful_total"));
        assert!(!text.contains("benchmark_requests_failed_total"));
        // Failure without a duration never reaches the histogram.
        assert!(text.contains(&format!(
            "benchmark_request_duration_seconds_count{{benchmark_id=\"{id}\",service=\"ollama\"}} 2"
        )));
        assert!(text.contains("le=\"0.1\""));
    }

    #[test]
    fn empty_registry_still_encodes() {
        let exposition = MetricsExposition::new().unwrap();
        let text = exposition.encode().unwrap();
        assert!(text.is_empty() || !text.contains("benchmark_requests_total{"));
    }
}
