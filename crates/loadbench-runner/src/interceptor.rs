use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::Instant;
use tracing::warn;

use loadbench_core::{BenchmarkId, ErrorClass, RequestMetric};
use loadbench_probe::ServiceProbe;
use loadbench_store::MetricsStore;

/// How one intercepted invocation ended, after its metric was handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Observation {
    /// Probe succeeded and the metric was recorded.
    Success,
    /// Probe failed and the failure metric was recorded.
    Failure,
    /// The metric could not be persisted. The invocation result is
    /// folded into this: recording is part of the contract.
    StoreError,
}

/// Wraps every probe invocation of one logical client.
///
/// Guarantees exactly one [`RequestMetric`] per invocation and never
/// lets probe or store errors escape: every outcome, including a failed
/// append, degrades to an [`Observation`].
pub struct MetricsInterceptor {
    store: Arc<dyn MetricsStore>,
    benchmark_id: BenchmarkId,
    service_name: String,
    client_id: u32,
    request_timeout: Duration,
    grace_deadline: Instant,
    // Wall-clock anchor paired with a tokio instant taken at the same
    // moment. Timestamps are stamped as anchor plus elapsed, so they
    // stay monotonic within a run and track the runtime clock.
    epoch_anchor: f64,
    instant_anchor: Instant,
}

impl MetricsInterceptor {
    pub fn new(
        store: Arc<dyn MetricsStore>,
        benchmark_id: BenchmarkId,
        service_name: impl Into<String>,
        client_id: u32,
        request_timeout: Duration,
        grace_deadline: Instant,
    ) -> Self {
        Self {
            store,
            benchmark_id,
            service_name: service_name.into(),
            client_id,
            request_timeout,
            grace_deadline,
            epoch_anchor: epoch_secs(),
            instant_anchor: Instant::now(),
        }
    }

    /// Invokes the probe once and records the outcome.
    ///
    /// The invocation is bounded twice: by the per-request timeout and
    /// by the run's grace deadline. A request still in flight at the
    /// grace deadline is abandoned and recorded as a timeout with no
    /// measured duration.
    pub async fn observe(&self, probe: &dyn ServiceProbe) -> Observation {
        let started = Instant::now();
        let issued_at = self.epoch_anchor + (started - self.instant_anchor).as_secs_f64();

        let metric = tokio::select! {
            result = tokio::time::timeout(self.request_timeout, probe.call()) => {
                let elapsed = started.elapsed().as_secs_f64();
                match result {
                    Ok(Ok(outcome)) => RequestMetric::success(
                        self.benchmark_id,
                        self.service_name.clone(),
                        self.client_id,
                        issued_at,
                        elapsed,
                        outcome.status_code,
                    ),
                    Ok(Err(err)) => RequestMetric::failure(
                        self.benchmark_id,
                        self.service_name.clone(),
                        self.client_id,
                        issued_at,
                        Some(elapsed),
                        None,
                        err.classify(),
                    ),
                    Err(_) => RequestMetric::failure(
                        self.benchmark_id,
                        self.service_name.clone(),
                        self.client_id,
                        issued_at,
                        Some(elapsed),
                        None,
                        ErrorClass::Timeout,
                    ),
                }
            }
            _ = tokio::time::sleep_until(self.grace_deadline) => {
                RequestMetric::failure(
                    self.benchmark_id,
                    self.service_name.clone(),
                    self.client_id,
                    issued_at,
                    None,
                    None,
                    ErrorClass::Timeout,
                )
            }
        };

        let succeeded = metric.success;
        if let Err(err) = self.store.append(&metric).await {
            warn!(
                service = %self.service_name,
                client = self.client_id,
                error = %err,
                "failed to record request metric"
            );
            return Observation::StoreError;
        }

        if succeeded {
            Observation::Success
        } else {
            Observation::Failure
        }
    }
}

fn epoch_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
