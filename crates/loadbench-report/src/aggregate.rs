use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use loadbench_core::{BenchmarkId, RequestMetric};

/// Deterministic aggregation of one benchmark run.
///
/// The same input metrics always serialize to the same JSON: maps are
/// ordered, samples are sorted with a total order, and no floating
/// aggregate depends on input order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub benchmark_id: BenchmarkId,
    /// RFC 3339, second precision, UTC.
    pub generated_at: String,
    pub summary: Summary,
    pub timing: Timing,
    pub percentiles: Percentiles,
    /// Per-service breakdowns keyed by service name, sorted.
    pub services: BTreeMap<String, ServiceReport>,
    /// Requests whose metric could not be persisted, keyed by service
    /// name. These never appear in the counts above; a non-zero entry
    /// means the framework lost observations, not that the service
    /// failed.
    #[serde(default)]
    pub store_errors: BTreeMap<String, u64>,
}

/// Request counts and rates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Successful over total as a percentage, 0 to 100; 0.0 for an
    /// empty window, never NaN.
    pub success_rate: f64,
    /// Observed issue-time span in seconds, first request to last.
    pub total_duration_secs: f64,
    /// Total requests over the observed issue-time span; 0.0 when the
    /// span is degenerate.
    pub throughput_rps: f64,
}

/// Duration statistics over every request that measured one, failed
/// requests included.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    pub samples: u64,
    pub mean_secs: f64,
    /// Interpolated median of the sorted sample.
    pub median_secs: f64,
    pub min_secs: f64,
    pub max_secs: f64,
    /// Sample standard deviation (n - 1); 0.0 below two samples.
    pub stddev_secs: f64,
}

/// Interpolated duration percentiles (R-7 estimator).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

/// One service's slice of the run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceReport {
    pub summary: Summary,
    pub timing: Timing,
    pub percentiles: Percentiles,
    /// Failure counts keyed by error class, sorted.
    pub errors: BTreeMap<String, u64>,
}

/// Aggregates recorded metrics into a report.
pub fn aggregate(
    benchmark_id: BenchmarkId,
    generated_at: DateTime<Utc>,
    metrics: &[RequestMetric],
) -> AggregateReport {
    let mut services: BTreeMap<String, Vec<&RequestMetric>> = BTreeMap::new();
    for metric in metrics {
        services
            .entry(metric.service_name.clone())
            .or_default()
            .push(metric);
    }

    let all: Vec<&RequestMetric> = metrics.iter().collect();
    let (summary, timing, percentiles) = aggregate_slice(&all);

    AggregateReport {
        benchmark_id,
        generated_at: generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        summary,
        timing,
        percentiles,
        services: services
            .into_iter()
            .map(|(name, slice)| {
                let (summary, timing, percentiles) = aggregate_slice(&slice);
                let mut errors = BTreeMap::new();
                for metric in &slice {
                    if let Some(class) = metric.error {
                        *errors.entry(class.as_str().to_string()).or_insert(0) += 1;
                    }
                }
                (
                    name,
                    ServiceReport {
                        summary,
                        timing,
                        percentiles,
                        errors,
                    },
                )
            })
            .collect(),
        store_errors: BTreeMap::new(),
    }
}

fn aggregate_slice(metrics: &[&RequestMetric]) -> (Summary, Timing, Percentiles) {
    let total = metrics.len() as u64;
    let successful = metrics.iter().filter(|m| m.success).count() as u64;

    let mut durations: Vec<f64> = metrics.iter().filter_map(|m| m.duration_secs).collect();
    durations.sort_by(f64::total_cmp);

    let span = match (
        metrics.iter().map(|m| m.timestamp).reduce(f64::min),
        metrics.iter().map(|m| m.timestamp).reduce(f64::max),
    ) {
        (Some(first), Some(last)) => last - first,
        _ => 0.0,
    };

    let summary = Summary {
        total_requests: total,
        successful_requests: successful,
        failed_requests: total - successful,
        success_rate: if total == 0 {
            0.0
        } else {
            100.0 * successful as f64 / total as f64
        },
        total_duration_secs: span,
        throughput_rps: if span > 0.0 { total as f64 / span } else { 0.0 },
    };

    (summary, timing_of(&durations), percentiles_of(&durations))
}

fn timing_of(sorted: &[f64]) -> Timing {
    let n = sorted.len();
    if n == 0 {
        return Timing {
            samples: 0,
            mean_secs: 0.0,
            median_secs: 0.0,
            min_secs: 0.0,
            max_secs: 0.0,
            stddev_secs: 0.0,
        };
    }
    let mean = sorted.iter().sum::<f64>() / n as f64;
    let stddev = if n < 2 {
        0.0
    } else {
        let variance =
            sorted.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / (n as f64 - 1.0);
        variance.sqrt()
    };
    Timing {
        samples: n as u64,
        mean_secs: mean,
        median_secs: percentile(sorted, 0.50),
        min_secs: sorted[0],
        max_secs: sorted[n - 1],
        stddev_secs: stddev,
    }
}

fn percentiles_of(sorted: &[f64]) -> Percentiles {
    Percentiles {
        p50: percentile(sorted, 0.50),
        p90: percentile(sorted, 0.90),
        p95: percentile(sorted, 0.95),
        p99: percentile(sorted, 0.99),
    }
}

/// Linear-interpolation percentile over a sorted sample (R-7, the
/// spreadsheet/NumPy default). 0.0 on an empty sample.
fn percentile(sorted: &[f64], rank: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let h = (n - 1) as f64 * rank;
            let lo = h.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
        }
    }
}
