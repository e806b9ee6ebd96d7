use async_trait::async_trait;

use loadbench_core::{BenchResult, BenchmarkId, RequestMetric};

/// Append-only, concurrently-writable storage for request metrics.
///
/// All writers append, none mutate existing records. Reads return a
/// consistent snapshot and may run while writers are active, so the
/// store can be queried for progress before a run completes.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Durably records one observation.
    ///
    /// Implementations retry transient failures with bounded backoff
    /// before surfacing [`loadbench_core::BenchError::Store`]; they
    /// never silently drop a record.
    async fn append(&self, metric: &RequestMetric) -> BenchResult<()>;

    /// Returns all metrics for a run, ordered by timestamp.
    async fn fetch(&self, benchmark_id: BenchmarkId) -> BenchResult<Vec<RequestMetric>>;

    /// Returns all metrics for one service within a run, ordered by
    /// timestamp.
    async fn fetch_service(
        &self,
        benchmark_id: BenchmarkId,
        service_name: &str,
    ) -> BenchResult<Vec<RequestMetric>>;

    /// Returns all metrics recorded by one logical client of one
    /// service, in request order.
    async fn fetch_client(
        &self,
        benchmark_id: BenchmarkId,
        service_name: &str,
        client_id: u32,
    ) -> BenchResult<Vec<RequestMetric>>;

    /// Counts recorded metrics for a run (progress queries).
    async fn count(&self, benchmark_id: BenchmarkId) -> BenchResult<u64>;

    /// Barrier: after this returns, every previously appended record is
    /// visible to subsequent reads and durably persisted.
    async fn flush(&self) -> BenchResult<()>;
}
