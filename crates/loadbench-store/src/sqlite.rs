use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use loadbench_core::{
    BenchError, BenchResult, BenchmarkId, ErrorClass, RequestMetric, StoreConfig,
};

use crate::traits::MetricsStore;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS metrics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    benchmark_id TEXT NOT NULL,
    service_name TEXT NOT NULL,
    client_id INTEGER NOT NULL,
    timestamp REAL NOT NULL,
    request_duration REAL,
    success INTEGER NOT NULL,
    status_code TEXT,
    error TEXT
)
"#;

const CREATE_RUN_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_metrics_benchmark ON metrics(benchmark_id)";

const CREATE_SERVICE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_metrics_service ON metrics(benchmark_id, service_name)";

const SELECT_COLUMNS: &str = "SELECT benchmark_id, service_name, client_id, timestamp, \
     request_duration, success, status_code, error FROM metrics";

/// Connection and retry settings for the SQLite store.
#[derive(Clone, Debug)]
pub struct SqliteStoreOptions {
    /// Database file path; created when missing.
    pub path: PathBuf,
    /// Max connections in the pool.
    pub max_connections: u32,
    /// Append retry attempts before surfacing a store error.
    pub append_retries: u32,
    /// Initial retry backoff, doubled per attempt.
    pub retry_backoff: Duration,
}

impl SqliteStoreOptions {
    /// Builds options for a path with default pool/retry settings.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_connections: 8,
            append_retries: 5,
            retry_backoff: Duration::from_millis(50),
        }
    }
}

impl From<&StoreConfig> for SqliteStoreOptions {
    fn from(config: &StoreConfig) -> Self {
        Self {
            path: PathBuf::from(&config.path),
            max_connections: config.max_connections,
            append_retries: config.append_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

/// SQLite-backed metrics store.
///
/// WAL journal mode allows readers to observe a consistent snapshot
/// while writers append; the pool serializes physical writes.
pub struct SqliteMetricsStore {
    pool: SqlitePool,
    append_retries: u32,
    retry_backoff: Duration,
}

impl SqliteMetricsStore {
    /// Opens (creating if missing) the database and ensures the schema.
    pub async fn connect(options: SqliteStoreOptions) -> BenchResult<Self> {
        let connect_options = SqliteConnectOptions::new()
            .filename(&options.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections)
            .connect_with(connect_options)
            .await
            .map_err(|err| BenchError::store(format!("failed to open metrics db: {err}")))?;

        for statement in [CREATE_TABLE, CREATE_RUN_INDEX, CREATE_SERVICE_INDEX] {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(|err| BenchError::store(format!("failed to init schema: {err}")))?;
        }

        debug!(path = %options.path.display(), "metrics store opened");
        Ok(Self {
            pool,
            append_retries: options.append_retries,
            retry_backoff: options.retry_backoff,
        })
    }

    /// Convenience constructor with default options.
    pub async fn open(path: impl AsRef<Path>) -> BenchResult<Self> {
        Self::connect(SqliteStoreOptions::new(path.as_ref())).await
    }

    /// Returns the underlying pool (useful for composing queries).
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn try_append(&self, metric: &RequestMetric) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO metrics
                (benchmark_id, service_name, client_id, timestamp,
                 request_duration, success, status_code, error)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(metric.benchmark_id.to_string())
        .bind(&metric.service_name)
        .bind(i64::from(metric.client_id))
        .bind(metric.timestamp)
        .bind(metric.duration_secs)
        .bind(i64::from(metric.success))
        .bind(metric.status_code.as_deref())
        .bind(metric.error.map(|e| e.as_str()))
        .execute(&self.pool)
        .await
        .map(|_| ())
    }

    fn map_row(row: &SqliteRow) -> BenchResult<RequestMetric> {
        let benchmark_id: String = row.get("benchmark_id");
        let benchmark_id = BenchmarkId::from_str(&benchmark_id)
            .map_err(|err| BenchError::store(format!("invalid benchmark_id: {err}")))?;
        let client_id: i64 = row.get("client_id");
        let success: i64 = row.get("success");
        let error: Option<String> = row.get("error");
        let error = error.as_deref().map(ErrorClass::from_str).transpose()?;

        Ok(RequestMetric {
            benchmark_id,
            service_name: row.get("service_name"),
            client_id: client_id as u32,
            timestamp: row.get("timestamp"),
            duration_secs: row.get("request_duration"),
            success: success != 0,
            status_code: row.get("status_code"),
            error,
        })
    }

    fn map_rows(rows: Vec<SqliteRow>) -> BenchResult<Vec<RequestMetric>> {
        rows.iter().map(Self::map_row).collect()
    }
}

#[async_trait]
impl MetricsStore for SqliteMetricsStore {
    async fn append(&self, metric: &RequestMetric) -> BenchResult<()> {
        let mut backoff = self.retry_backoff;
        let mut last_error = None;

        for attempt in 0..=self.append_retries {
            match self.try_append(metric).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(
                        attempt,
                        error = %err,
                        service = %metric.service_name,
                        "metrics append failed"
                    );
                    last_error = Some(err);
                    if attempt < self.append_retries {
                        tokio::time::sleep(backoff).await;
                        backoff = backoff.saturating_mul(2);
                    }
                }
            }
        }

        Err(BenchError::store(format!(
            "append failed after {} retries: {}",
            self.append_retries,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    async fn fetch(&self, benchmark_id: BenchmarkId) -> BenchResult<Vec<RequestMetric>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE benchmark_id = ?1 ORDER BY timestamp, id"
        ))
        .bind(benchmark_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|err| BenchError::store(err.to_string()))?;
        Self::map_rows(rows)
    }

    async fn fetch_service(
        &self,
        benchmark_id: BenchmarkId,
        service_name: &str,
    ) -> BenchResult<Vec<RequestMetric>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE benchmark_id = ?1 AND service_name = ?2 \
             ORDER BY timestamp, id"
        ))
        .bind(benchmark_id.to_string())
        .bind(service_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|err| BenchError::store(err.to_string()))?;
        Self::map_rows(rows)
    }

    async fn fetch_client(
        &self,
        benchmark_id: BenchmarkId,
        service_name: &str,
        client_id: u32,
    ) -> BenchResult<Vec<RequestMetric>> {
        // Insertion order (rowid) preserves one client's request order.
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE benchmark_id = ?1 AND service_name = ?2 \
             AND client_id = ?3 ORDER BY id"
        ))
        .bind(benchmark_id.to_string())
        .bind(service_name)
        .bind(i64::from(client_id))
        .fetch_all(&self.pool)
        .await
        .map_err(|err| BenchError::store(err.to_string()))?;
        Self::map_rows(rows)
    }

    async fn count(&self, benchmark_id: BenchmarkId) -> BenchResult<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM metrics WHERE benchmark_id = ?1")
            .bind(benchmark_id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(|err| BenchError::store(err.to_string()))?;
        let count: i64 = row.get("n");
        Ok(count as u64)
    }

    async fn flush(&self) -> BenchResult<()> {
        sqlx::query("PRAGMA wal_checkpoint(FULL)")
            .execute(&self.pool)
            .await
            .map_err(|err| BenchError::store(format!("checkpoint failed: {err}")))?;
        Ok(())
    }
}
