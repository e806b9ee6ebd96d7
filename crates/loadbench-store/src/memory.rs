use async_trait::async_trait;
use parking_lot::RwLock;

use loadbench_core::{BenchResult, BenchmarkId, RequestMetric};

use crate::traits::MetricsStore;

/// In-memory metrics store.
///
/// Used by tests and short-lived runs that do not need durability;
/// mirrors the SQLite store's ordering semantics.
#[derive(Default)]
pub struct MemoryMetricsStore {
    records: RwLock<Vec<RequestMetric>>,
}

impl MemoryMetricsStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records across all runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// True when no records have been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn sorted(mut records: Vec<RequestMetric>) -> Vec<RequestMetric> {
        records.sort_by(|a, b| {
            a.timestamp
                .partial_cmp(&b.timestamp)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        records
    }
}

#[async_trait]
impl MetricsStore for MemoryMetricsStore {
    async fn append(&self, metric: &RequestMetric) -> BenchResult<()> {
        self.records.write().push(metric.clone());
        Ok(())
    }

    async fn fetch(&self, benchmark_id: BenchmarkId) -> BenchResult<Vec<RequestMetric>> {
        let records = self
            .records
            .read()
            .iter()
            .filter(|m| m.benchmark_id == benchmark_id)
            .cloned()
            .collect();
        Ok(Self::sorted(records))
    }

    async fn fetch_service(
        &self,
        benchmark_id: BenchmarkId,
        service_name: &str,
    ) -> BenchResult<Vec<RequestMetric>> {
        let records = self
            .records
            .read()
            .iter()
            .filter(|m| m.benchmark_id == benchmark_id && m.service_name == service_name)
            .cloned()
            .collect();
        Ok(Self::sorted(records))
    }

    async fn fetch_client(
        &self,
        benchmark_id: BenchmarkId,
        service_name: &str,
        client_id: u32,
    ) -> BenchResult<Vec<RequestMetric>> {
        // Insertion order preserves each client's own request order.
        let records = self
            .records
            .read()
            .iter()
            .filter(|m| {
                m.benchmark_id == benchmark_id
                    && m.service_name == service_name
                    && m.client_id == client_id
            })
            .cloned()
            .collect();
        Ok(records)
    }

    async fn count(&self, benchmark_id: BenchmarkId) -> BenchResult<u64> {
        let count = self
            .records
            .read()
            .iter()
            .filter(|m| m.benchmark_id == benchmark_id)
            .count();
        Ok(count as u64)
    }

    async fn flush(&self) -> BenchResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use loadbench_core::ErrorClass;

    use super::*;

    #[tokio::test]
    async fn filters_by_run_service_and_client() {
        let store = MemoryMetricsStore::new();
        let run_a = BenchmarkId::new();
        let run_b = BenchmarkId::new();

        for (run, service, client) in [
            (run_a, "svc-1", 0),
            (run_a, "svc-1", 1),
            (run_a, "svc-2", 0),
            (run_b, "svc-1", 0),
        ] {
            store
                .append(&RequestMetric::success(
                    run, service, client, 1.0, 0.01, None,
                ))
                .await
                .unwrap();
        }

        assert_eq!(store.fetch(run_a).await.unwrap().len(), 3);
        assert_eq!(store.fetch_service(run_a, "svc-1").await.unwrap().len(), 2);
        assert_eq!(
            store.fetch_client(run_a, "svc-1", 1).await.unwrap().len(),
            1
        );
        assert_eq!(store.count(run_b).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn fetch_orders_by_timestamp() {
        let store = MemoryMetricsStore::new();
        let run = BenchmarkId::new();
        for ts in [3.0, 1.0, 2.0] {
            store
                .append(&RequestMetric::failure(
                    run,
                    "svc",
                    0,
                    ts,
                    None,
                    None,
                    ErrorClass::Connection,
                ))
                .await
                .unwrap();
        }
        let fetched = store.fetch(run).await.unwrap();
        let stamps: Vec<f64> = fetched.iter().map(|m| m.timestamp).collect();
        assert_eq!(stamps, vec![1.0, 2.0, 3.0]);
    }
}
