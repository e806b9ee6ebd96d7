use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use loadbench_core::{BenchError, BenchResult, BenchmarkId, ServiceRunSpec};
use loadbench_probe::ServiceProbe;
use loadbench_store::MetricsStore;

use crate::interceptor::{MetricsInterceptor, Observation};

/// Counters for one completed service run, summed over its clients.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ServiceRunStats {
    /// Requests actually issued. Missed ticks are skipped, not queued,
    /// so this can be below the rate-times-duration target.
    pub issued: u64,
    /// Requests that completed successfully and were recorded.
    pub succeeded: u64,
    /// Requests that failed and were recorded.
    pub failed: u64,
    /// Invocations whose metric could not be persisted.
    pub store_errors: u64,
}

impl ServiceRunStats {
    fn absorb(&mut self, other: ServiceRunStats) {
        self.issued += other.issued;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.store_errors += other.store_errors;
    }
}

/// Runs one service spec to completion.
///
/// Spawns `client_count` independent clients, each pacing itself with a
/// fixed-interval ticker at `requests_per_second`. A tick that arrives
/// while the previous request is still in flight is dropped rather than
/// queued, so the achieved rate is best effort. New requests stop at
/// the duration deadline or on the abort signal; in-flight requests are
/// given until the grace deadline.
pub async fn run_service(
    benchmark_id: BenchmarkId,
    spec: &ServiceRunSpec,
    probe: Arc<dyn ServiceProbe>,
    store: Arc<dyn MetricsStore>,
    grace_multiplier: f64,
    abort: watch::Receiver<bool>,
) -> BenchResult<ServiceRunStats> {
    probe.setup().await?;

    let period = Duration::from_secs_f64(1.0 / spec.requests_per_second);
    let start = Instant::now();
    let deadline = start + Duration::from_secs_f64(spec.duration_secs);
    let grace_deadline = start + Duration::from_secs_f64(spec.duration_secs * grace_multiplier);

    info!(
        service = %spec.service_name,
        clients = spec.client_count,
        rate = spec.requests_per_second,
        duration_secs = spec.duration_secs,
        "starting service run"
    );

    let mut clients = JoinSet::new();
    for client_id in 0..spec.client_count {
        let interceptor = MetricsInterceptor::new(
            Arc::clone(&store),
            benchmark_id,
            spec.service_name.clone(),
            client_id,
            Duration::from_secs(spec.request_timeout_secs),
            grace_deadline,
        );
        let probe = Arc::clone(&probe);
        let abort = abort.clone();
        clients.spawn(run_client(interceptor, probe, period, deadline, abort));
    }

    let mut stats = ServiceRunStats::default();
    while let Some(joined) = clients.join_next().await {
        let client = joined
            .map_err(|err| BenchError::config(format!("client task panicked: {err}")))?;
        stats.absorb(client);
    }

    info!(
        service = %spec.service_name,
        issued = stats.issued,
        succeeded = stats.succeeded,
        failed = stats.failed,
        "service run finished"
    );
    Ok(stats)
}

async fn run_client(
    interceptor: MetricsInterceptor,
    probe: Arc<dyn ServiceProbe>,
    period: Duration,
    deadline: Instant,
    mut abort: watch::Receiver<bool>,
) -> ServiceRunStats {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut stats = ServiceRunStats::default();
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if Instant::now() >= deadline {
                    break;
                }
                stats.issued += 1;
                match interceptor.observe(probe.as_ref()).await {
                    Observation::Success => stats.succeeded += 1,
                    Observation::Failure => stats.failed += 1,
                    Observation::StoreError => {
                        stats.failed += 1;
                        stats.store_errors += 1;
                    }
                }
            }
            _ = tokio::time::sleep_until(deadline) => break,
            changed = abort.changed() => {
                if changed.is_err() || *abort.borrow() {
                    debug!("client aborting before deadline");
                    break;
                }
            }
        }
    }
    stats
}
