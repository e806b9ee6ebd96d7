use serde::{Deserialize, Serialize};

use crate::error::ErrorClass;
use crate::ids::BenchmarkId;

/// One immutable observation of a single probe invocation.
///
/// Created by the metrics interceptor, persisted exactly once to the
/// metrics store, never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestMetric {
    /// Run this observation belongs to.
    pub benchmark_id: BenchmarkId,
    /// Service the request was issued against.
    pub service_name: String,
    /// 0-indexed logical client within its service run.
    pub client_id: u32,
    /// Issue time, epoch seconds.
    pub timestamp: f64,
    /// Elapsed seconds measured on a monotonic clock. `None` when no
    /// duration was measured before the failure was detected.
    pub duration_secs: Option<f64>,
    /// Whether the invocation succeeded.
    pub success: bool,
    /// HTTP status or operation-specific result code, when one exists.
    pub status_code: Option<String>,
    /// Failure classification, populated only on failure.
    pub error: Option<ErrorClass>,
}

impl RequestMetric {
    /// Builds a success record.
    #[must_use]
    pub fn success(
        benchmark_id: BenchmarkId,
        service_name: impl Into<String>,
        client_id: u32,
        timestamp: f64,
        duration_secs: f64,
        status_code: Option<String>,
    ) -> Self {
        Self {
            benchmark_id,
            service_name: service_name.into(),
            client_id,
            timestamp,
            duration_secs: Some(duration_secs),
            success: true,
            status_code,
            error: None,
        }
    }

    /// Builds a failure record carrying its classification.
    #[must_use]
    pub fn failure(
        benchmark_id: BenchmarkId,
        service_name: impl Into<String>,
        client_id: u32,
        timestamp: f64,
        duration_secs: Option<f64>,
        status_code: Option<String>,
        error: ErrorClass,
    ) -> Self {
        Self {
            benchmark_id,
            service_name: service_name.into(),
            client_id,
            timestamp,
            duration_secs,
            success: false,
            status_code,
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_carries_classification() {
        let metric = RequestMetric::failure(
            BenchmarkId::new(),
            "ollama",
            3,
            1_700_000_000.0,
            Some(0.25),
            None,
            ErrorClass::Connection,
        );
        assert!(!metric.success);
        assert_eq!(metric.error, Some(ErrorClass::Connection));
        assert_eq!(metric.client_id, 3);
    }

    #[test]
    fn metric_json_uses_stable_error_strings() {
        let metric = RequestMetric::failure(
            BenchmarkId::new(),
            "pg",
            0,
            1.0,
            None,
            Some("08001".into()),
            ErrorClass::Timeout,
        );
        let json = serde_json::to_value(&metric).unwrap();
        assert_eq!(json["error"], "timeout");
        assert_eq!(json["status_code"], "08001");
    }
}
