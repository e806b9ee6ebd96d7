use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, warn};

use loadbench_core::{BenchError, BenchResult, BenchmarkId, BenchmarkPlan, RunConfig, ServiceRunSpec};
use loadbench_store::MetricsStore;

use crate::generator::{run_service, ServiceRunStats};

/// Terminal state of one service spec within a run.
#[derive(Clone, Debug)]
pub enum ServiceStatus {
    /// The run executed to its deadline (or abort) and produced stats.
    Completed(ServiceRunStats),
    /// The spec never started: it failed validation or probe
    /// construction. Sibling specs are unaffected.
    Rejected { reason: String },
    /// The run started but ended with an error (setup failure, panic).
    Failed { reason: String },
}

/// Per-service result paired with its name, in plan order.
#[derive(Clone, Debug)]
pub struct ServiceOutcome {
    pub service_name: String,
    pub status: ServiceStatus,
}

impl ServiceOutcome {
    /// True when at least one request against this service succeeded.
    #[must_use]
    pub fn had_success(&self) -> bool {
        matches!(&self.status, ServiceStatus::Completed(stats) if stats.succeeded > 0)
    }
}

/// The complete result of executing a benchmark plan.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    pub benchmark_id: BenchmarkId,
    pub elapsed: Duration,
    pub services: Vec<ServiceOutcome>,
}

impl RunOutcome {
    /// True when every service spec recorded at least one success.
    /// Drives the process exit code.
    #[must_use]
    pub fn all_services_succeeded(&self) -> bool {
        !self.services.is_empty() && self.services.iter().all(ServiceOutcome::had_success)
    }

    /// Invocations whose metric could not be persisted, per service.
    /// Only services that lost at least one record appear. These
    /// requests are absent from the store, so the report layer cannot
    /// recover them from fetched metrics.
    #[must_use]
    pub fn store_error_counts(&self) -> BTreeMap<String, u64> {
        self.services
            .iter()
            .filter_map(|service| match &service.status {
                ServiceStatus::Completed(stats) if stats.store_errors > 0 => {
                    Some((service.service_name.clone(), stats.store_errors))
                }
                _ => None,
            })
            .collect()
    }

    /// Total records lost to store errors across all services.
    #[must_use]
    pub fn total_store_errors(&self) -> u64 {
        self.store_error_counts().values().sum()
    }
}

/// Executes benchmark plans against a shared metrics store.
pub struct BenchmarkRunner {
    store: Arc<dyn MetricsStore>,
    config: RunConfig,
}

impl BenchmarkRunner {
    pub fn new(store: Arc<dyn MetricsStore>, config: RunConfig) -> Self {
        Self { store, config }
    }

    /// Runs every service spec in the plan and flushes the store.
    ///
    /// Invalid specs are rejected individually; the rest still run.
    /// Services run sequentially unless the run config enables a
    /// bounded parallel pool. The abort receiver stops new requests
    /// across all services when it flips to `true`.
    pub async fn execute(
        &self,
        plan: &BenchmarkPlan,
        abort: watch::Receiver<bool>,
    ) -> BenchResult<RunOutcome> {
        let benchmark_id = BenchmarkId::new();
        let started = Instant::now();
        info!(%benchmark_id, services = plan.services.len(), "starting benchmark run");

        let mut seen = HashSet::new();
        let mut admitted: Vec<(usize, &ServiceRunSpec)> = Vec::new();
        let mut outcomes: Vec<Option<ServiceOutcome>> = Vec::new();
        for (idx, spec) in plan.services.iter().enumerate() {
            let rejection = if !seen.insert(spec.service_name.clone()) {
                Some(format!("duplicate service name `{}`", spec.service_name))
            } else if let Err(err) = spec.validate() {
                Some(err.to_string())
            } else {
                None
            };
            match rejection {
                Some(reason) => {
                    warn!(service = %spec.service_name, %reason, "rejecting service spec");
                    outcomes.push(Some(ServiceOutcome {
                        service_name: spec.service_name.clone(),
                        status: ServiceStatus::Rejected { reason },
                    }));
                }
                None => {
                    admitted.push((idx, spec));
                    outcomes.push(None);
                }
            }
        }

        if self.config.parallel {
            self.execute_parallel(benchmark_id, &admitted, &mut outcomes, &abort)
                .await?;
        } else {
            for (idx, spec) in &admitted {
                let status = self.run_one(benchmark_id, spec, abort.clone()).await;
                outcomes[*idx] = Some(ServiceOutcome {
                    service_name: spec.service_name.clone(),
                    status,
                });
            }
        }

        self.store.flush().await?;

        let services = outcomes
            .into_iter()
            .map(|outcome| {
                outcome.ok_or_else(|| BenchError::config("service outcome missing after run"))
            })
            .collect::<BenchResult<Vec<_>>>()?;

        let outcome = RunOutcome {
            benchmark_id,
            elapsed: started.elapsed(),
            services,
        };
        info!(
            %benchmark_id,
            elapsed_secs = outcome.elapsed.as_secs_f64(),
            ok = outcome.all_services_succeeded(),
            "benchmark run finished"
        );
        Ok(outcome)
    }

    async fn execute_parallel(
        &self,
        benchmark_id: BenchmarkId,
        admitted: &[(usize, &ServiceRunSpec)],
        outcomes: &mut [Option<ServiceOutcome>],
        abort: &watch::Receiver<bool>,
    ) -> BenchResult<()> {
        let semaphore = Arc::new(Semaphore::new(self.config.service_concurrency()));
        let mut running = JoinSet::new();
        for (idx, spec) in admitted {
            let semaphore = Arc::clone(&semaphore);
            let store = Arc::clone(&self.store);
            let grace_multiplier = self.config.grace_multiplier;
            let spec = (*spec).clone();
            let abort = abort.clone();
            let idx = *idx;
            running.spawn(async move {
                let permit = semaphore.acquire_owned().await;
                let status = match permit {
                    Ok(_permit) => run_spec(benchmark_id, &spec, store, grace_multiplier, abort).await,
                    Err(_) => ServiceStatus::Failed {
                        reason: "service pool closed".to_string(),
                    },
                };
                (idx, spec.service_name, status)
            });
        }

        while let Some(joined) = running.join_next().await {
            let (idx, service_name, status) = joined
                .map_err(|err| BenchError::config(format!("service task panicked: {err}")))?;
            outcomes[idx] = Some(ServiceOutcome {
                service_name,
                status,
            });
        }
        Ok(())
    }

    async fn run_one(
        &self,
        benchmark_id: BenchmarkId,
        spec: &ServiceRunSpec,
        abort: watch::Receiver<bool>,
    ) -> ServiceStatus {
        run_spec(
            benchmark_id,
            spec,
            Arc::clone(&self.store),
            self.config.grace_multiplier,
            abort,
        )
        .await
    }
}

async fn run_spec(
    benchmark_id: BenchmarkId,
    spec: &ServiceRunSpec,
    store: Arc<dyn MetricsStore>,
    grace_multiplier: f64,
    abort: watch::Receiver<bool>,
) -> ServiceStatus {
    let probe = match loadbench_probe::build_probe(spec) {
        Ok(probe) => probe,
        Err(err) => {
            warn!(service = %spec.service_name, error = %err, "probe construction failed");
            return ServiceStatus::Rejected {
                reason: err.to_string(),
            };
        }
    };

    match run_service(benchmark_id, spec, probe, store, grace_multiplier, abort).await {
        Ok(stats) => ServiceStatus::Completed(stats),
        Err(err) => {
            error!(service = %spec.service_name, error = %err, "service run failed");
            ServiceStatus::Failed {
                reason: err.to_string(),
            }
        }
    }
}
