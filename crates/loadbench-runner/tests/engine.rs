//! Behavioral tests for the load generation engine, driven by mock
//! probes and the in-memory store so timing can run on paused clocks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use loadbench_core::{
    BenchError, BenchResult, BenchmarkId, BenchmarkPlan, ErrorClass, OperationMix, RequestMetric,
    RunConfig, ServiceRunSpec, ServiceTarget,
};
use loadbench_probe::{ProbeOutcome, ServiceProbe};
use loadbench_runner::{
    run_service, BenchmarkRunner, RunOutcome, ServiceOutcome, ServiceRunStats, ServiceStatus,
};
use loadbench_store::{MemoryMetricsStore, MetricsStore};

/// Probe whose behavior per call is fixed by the test.
struct MockProbe {
    delay: Duration,
    result: fn() -> BenchResult<ProbeOutcome>,
}

impl MockProbe {
    fn instant_ok() -> Self {
        Self {
            delay: Duration::ZERO,
            result: || Ok(ProbeOutcome::op("noop", 1)),
        }
    }

    fn refusing() -> Self {
        Self {
            delay: Duration::ZERO,
            result: || Err(BenchError::connection("connection refused")),
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            result: || Ok(ProbeOutcome::op("noop", 1)),
        }
    }
}

#[async_trait]
impl ServiceProbe for MockProbe {
    fn service_name(&self) -> &str {
        "mock"
    }

    async fn call(&self) -> BenchResult<ProbeOutcome> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.result)()
    }
}

/// Store whose appends always fail, for the degradation path.
struct BrokenStore;

#[async_trait]
impl MetricsStore for BrokenStore {
    async fn append(&self, _metric: &RequestMetric) -> BenchResult<()> {
        Err(BenchError::store("disk full"))
    }

    async fn fetch(&self, _benchmark_id: BenchmarkId) -> BenchResult<Vec<RequestMetric>> {
        Ok(Vec::new())
    }

    async fn fetch_service(
        &self,
        _benchmark_id: BenchmarkId,
        _service_name: &str,
    ) -> BenchResult<Vec<RequestMetric>> {
        Ok(Vec::new())
    }

    async fn fetch_client(
        &self,
        _benchmark_id: BenchmarkId,
        _service_name: &str,
        _client_id: u32,
    ) -> BenchResult<Vec<RequestMetric>> {
        Ok(Vec::new())
    }

    async fn count(&self, _benchmark_id: BenchmarkId) -> BenchResult<u64> {
        Ok(0)
    }

    async fn flush(&self) -> BenchResult<()> {
        Ok(())
    }
}

fn spec(rps: f64, duration_secs: f64, clients: u32, timeout_secs: u64) -> ServiceRunSpec {
    ServiceRunSpec {
        service_name: "mock".to_string(),
        client_count: clients,
        requests_per_second: rps,
        duration_secs,
        request_timeout_secs: timeout_secs,
        target: ServiceTarget::FileStorage {
            root_dir: std::env::temp_dir(),
            file_size_bytes: 1,
            operation_mix: OperationMix::new(&[("write", 1.0)]),
        },
    }
}

#[tokio::test(start_paused = true)]
async fn fixed_rate_single_client_hits_target() {
    let store = Arc::new(MemoryMetricsStore::new());
    let benchmark_id = BenchmarkId::new();
    let (_tx, rx) = tokio::sync::watch::channel(false);

    let stats = run_service(
        benchmark_id,
        &spec(10.0, 5.0, 1, 30),
        Arc::new(MockProbe::instant_ok()),
        Arc::clone(&store) as Arc<dyn MetricsStore>,
        2.0,
        rx,
    )
    .await
    .unwrap();

    assert_eq!(stats.issued, 50);
    assert_eq!(stats.succeeded, 50);
    assert_eq!(stats.failed, 0);
    assert_eq!(store.count(benchmark_id).await.unwrap(), 50);

    // At 10 rps the client stamps one request every 100 ms.
    let records = store.fetch_client(benchmark_id, "mock", 0).await.unwrap();
    assert_eq!(records.len(), 50);
    for pair in records.windows(2) {
        let delta = pair[1].timestamp - pair[0].timestamp;
        assert!((delta - 0.1).abs() < 1e-6, "inter-request delta {delta}");
    }
}

#[tokio::test(start_paused = true)]
async fn every_client_paces_independently() {
    let store = Arc::new(MemoryMetricsStore::new());
    let benchmark_id = BenchmarkId::new();
    let (_tx, rx) = tokio::sync::watch::channel(false);

    let stats = run_service(
        benchmark_id,
        &spec(5.0, 2.0, 4, 30),
        Arc::new(MockProbe::instant_ok()),
        Arc::clone(&store) as Arc<dyn MetricsStore>,
        2.0,
        rx,
    )
    .await
    .unwrap();

    // 4 clients x 5 rps x 2 s
    assert_eq!(stats.issued, 40);
    for client_id in 0..4 {
        let records = store
            .fetch_client(benchmark_id, "mock", client_id)
            .await
            .unwrap();
        assert_eq!(records.len(), 10);
    }
}

#[tokio::test(start_paused = true)]
async fn unreachable_service_records_connection_failures() {
    let store = Arc::new(MemoryMetricsStore::new());
    let benchmark_id = BenchmarkId::new();
    let (_tx, rx) = tokio::sync::watch::channel(false);

    let stats = run_service(
        benchmark_id,
        &spec(10.0, 1.0, 1, 30),
        Arc::new(MockProbe::refusing()),
        Arc::clone(&store) as Arc<dyn MetricsStore>,
        2.0,
        rx,
    )
    .await
    .unwrap();

    assert_eq!(stats.succeeded, 0);
    assert_eq!(stats.failed, stats.issued);

    let records = store.fetch(benchmark_id).await.unwrap();
    assert_eq!(records.len() as u64, stats.issued);
    for record in records {
        assert!(!record.success);
        assert_eq!(record.error, Some(ErrorClass::Connection));
        assert!(record.duration_secs.is_some());
    }
}

#[tokio::test(start_paused = true)]
async fn slow_request_times_out_at_request_bound() {
    let store = Arc::new(MemoryMetricsStore::new());
    let benchmark_id = BenchmarkId::new();
    let (_tx, rx) = tokio::sync::watch::channel(false);

    let stats = run_service(
        benchmark_id,
        &spec(1.0, 0.5, 1, 1),
        Arc::new(MockProbe::slow(Duration::from_secs(5))),
        Arc::clone(&store) as Arc<dyn MetricsStore>,
        10.0,
        rx,
    )
    .await
    .unwrap();

    assert_eq!(stats.issued, 1);
    assert_eq!(stats.failed, 1);

    let records = store.fetch(benchmark_id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].error, Some(ErrorClass::Timeout));
    let duration = records[0].duration_secs.unwrap();
    assert!((0.9..1.5).contains(&duration), "duration {duration}");
}

#[tokio::test(start_paused = true)]
async fn inflight_request_is_abandoned_at_grace_deadline() {
    let store = Arc::new(MemoryMetricsStore::new());
    let benchmark_id = BenchmarkId::new();
    let (_tx, rx) = tokio::sync::watch::channel(false);

    // Per-request timeout (60 s) far beyond the grace deadline (2 s),
    // so the grace bound is the one that fires.
    let stats = run_service(
        benchmark_id,
        &spec(1.0, 1.0, 1, 60),
        Arc::new(MockProbe::slow(Duration::from_secs(600))),
        Arc::clone(&store) as Arc<dyn MetricsStore>,
        2.0,
        rx,
    )
    .await
    .unwrap();

    assert_eq!(stats.issued, 1);
    assert_eq!(stats.failed, 1);

    let records = store.fetch(benchmark_id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].error, Some(ErrorClass::Timeout));
    assert!(records[0].duration_secs.is_none());
}

#[tokio::test(start_paused = true)]
async fn abort_stops_new_requests() {
    let store = Arc::new(MemoryMetricsStore::new());
    let benchmark_id = BenchmarkId::new();
    let (tx, rx) = tokio::sync::watch::channel(false);

    let spec = spec(10.0, 60.0, 1, 30);
    let run = run_service(
        benchmark_id,
        &spec,
        Arc::new(MockProbe::instant_ok()),
        Arc::clone(&store) as Arc<dyn MetricsStore>,
        2.0,
        rx,
    );
    let aborter = async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let _ = tx.send(true);
    };

    let (result, ()) = tokio::join!(run, aborter);
    let stats = result.unwrap();

    // ~10 requests in the first second, nowhere near the 600 target.
    assert!(stats.issued >= 9 && stats.issued <= 12, "issued {}", stats.issued);
}

#[tokio::test(start_paused = true)]
async fn unrecordable_metrics_degrade_to_store_errors() {
    let benchmark_id = BenchmarkId::new();
    let (_tx, rx) = tokio::sync::watch::channel(false);

    let stats = run_service(
        benchmark_id,
        &spec(10.0, 1.0, 1, 30),
        Arc::new(MockProbe::instant_ok()),
        Arc::new(BrokenStore) as Arc<dyn MetricsStore>,
        2.0,
        rx,
    )
    .await
    .unwrap();

    assert!(stats.issued > 0);
    assert_eq!(stats.succeeded, 0);
    assert_eq!(stats.store_errors, stats.issued);
}

#[test]
fn outcome_reports_store_error_counts_per_service() {
    let lossy = ServiceRunStats {
        issued: 10,
        succeeded: 7,
        failed: 0,
        store_errors: 3,
    };
    let clean = ServiceRunStats {
        issued: 10,
        succeeded: 10,
        failed: 0,
        store_errors: 0,
    };
    let outcome = RunOutcome {
        benchmark_id: BenchmarkId::new(),
        elapsed: Duration::from_secs(1),
        services: vec![
            ServiceOutcome {
                service_name: "lossy".to_string(),
                status: ServiceStatus::Completed(lossy),
            },
            ServiceOutcome {
                service_name: "clean".to_string(),
                status: ServiceStatus::Completed(clean),
            },
            ServiceOutcome {
                service_name: "bad-spec".to_string(),
                status: ServiceStatus::Rejected {
                    reason: "invalid".to_string(),
                },
            },
        ],
    };

    let counts = outcome.store_error_counts();
    assert_eq!(counts.len(), 1);
    assert_eq!(counts.get("lossy"), Some(&3));
    assert_eq!(outcome.total_store_errors(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn runner_executes_file_storage_plan_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryMetricsStore::new());
    let runner = BenchmarkRunner::new(
        Arc::clone(&store) as Arc<dyn MetricsStore>,
        RunConfig::default(),
    );

    let plan = BenchmarkPlan {
        services: vec![ServiceRunSpec {
            service_name: "scratch-disk".to_string(),
            client_count: 2,
            requests_per_second: 20.0,
            duration_secs: 0.5,
            request_timeout_secs: 5,
            target: ServiceTarget::FileStorage {
                root_dir: dir.path().to_path_buf(),
                file_size_bytes: 64,
                operation_mix: OperationMix::new(&[("write", 0.5), ("read", 0.5)]),
            },
        }],
    };

    let (_tx, rx) = tokio::sync::watch::channel(false);
    let outcome = runner.execute(&plan, rx).await.unwrap();

    assert!(outcome.all_services_succeeded());
    assert_eq!(outcome.services.len(), 1);
    let ServiceStatus::Completed(stats) = &outcome.services[0].status else {
        panic!("expected completed run, got {:?}", outcome.services[0].status);
    };
    assert!(stats.succeeded > 0);
    assert_eq!(
        store.count(outcome.benchmark_id).await.unwrap(),
        stats.issued
    );
}

#[tokio::test]
async fn invalid_spec_is_rejected_without_killing_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryMetricsStore::new());
    let runner = BenchmarkRunner::new(
        Arc::clone(&store) as Arc<dyn MetricsStore>,
        RunConfig::default(),
    );

    let good = ServiceRunSpec {
        service_name: "scratch-disk".to_string(),
        client_count: 1,
        requests_per_second: 10.0,
        duration_secs: 0.2,
        request_timeout_secs: 5,
        target: ServiceTarget::FileStorage {
            root_dir: dir.path().to_path_buf(),
            file_size_bytes: 16,
            operation_mix: OperationMix::new(&[("write", 1.0)]),
        },
    };
    let bad = ServiceRunSpec {
        service_name: "broken".to_string(),
        client_count: 0,
        ..good.clone()
    };

    let plan = BenchmarkPlan {
        services: vec![bad, good],
    };
    let (_tx, rx) = tokio::sync::watch::channel(false);
    let outcome = runner.execute(&plan, rx).await.unwrap();

    assert_eq!(outcome.services.len(), 2);
    assert!(matches!(
        outcome.services[0].status,
        ServiceStatus::Rejected { .. }
    ));
    assert!(outcome.services[1].had_success());
    assert!(!outcome.all_services_succeeded());
}

#[tokio::test]
async fn duplicate_service_names_reject_the_second_spec() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryMetricsStore::new());
    let runner = BenchmarkRunner::new(
        Arc::clone(&store) as Arc<dyn MetricsStore>,
        RunConfig::default(),
    );

    let spec = ServiceRunSpec {
        service_name: "scratch-disk".to_string(),
        client_count: 1,
        requests_per_second: 10.0,
        duration_secs: 0.2,
        request_timeout_secs: 5,
        target: ServiceTarget::FileStorage {
            root_dir: dir.path().to_path_buf(),
            file_size_bytes: 16,
            operation_mix: OperationMix::new(&[("write", 1.0)]),
        },
    };
    let plan = BenchmarkPlan {
        services: vec![spec.clone(), spec],
    };

    let (_tx, rx) = tokio::sync::watch::channel(false);
    let outcome = runner.execute(&plan, rx).await.unwrap();

    assert!(outcome.services[0].had_success());
    assert!(matches!(
        outcome.services[1].status,
        ServiceStatus::Rejected { .. }
    ));
}
