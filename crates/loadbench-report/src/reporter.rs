use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::info;

use loadbench_core::BenchResult;

use crate::aggregate::AggregateReport;

/// Writes the JSON report artifact to
/// `{artifact_dir}/{benchmark_id}_report.json` and returns its path.
///
/// The artifact is written before any optional export so a run always
/// leaves a durable result behind.
pub async fn write_report(
    report: &AggregateReport,
    artifact_dir: &Path,
) -> BenchResult<PathBuf> {
    tokio::fs::create_dir_all(artifact_dir).await?;

    let path = artifact_dir.join(format!("{}_report.json", report.benchmark_id));
    let json = serde_json::to_string_pretty(report)?;
    tokio::fs::write(&path, json).await?;

    info!(path = %path.display(), "wrote report artifact");
    Ok(path)
}

/// Renders a human-readable run summary for the terminal.
#[must_use]
pub fn render_text(report: &AggregateReport) -> String {
    let mut out = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(out, "benchmark {}", report.benchmark_id);
    let _ = writeln!(
        out,
        "  requests: {} total, {} ok, {} failed ({:.1}% success)",
        report.summary.total_requests,
        report.summary.successful_requests,
        report.summary.failed_requests,
        report.summary.success_rate
    );
    let _ = writeln!(
        out,
        "  throughput: {:.2} req/s   latency p50/p95/p99: {:.3}/{:.3}/{:.3} s",
        report.summary.throughput_rps,
        report.percentiles.p50,
        report.percentiles.p95,
        report.percentiles.p99
    );

    for (name, service) in &report.services {
        let _ = writeln!(
            out,
            "  {name}: {}/{} ok, p95 {:.3} s",
            service.summary.successful_requests,
            service.summary.total_requests,
            service.percentiles.p95
        );
        for (class, count) in &service.errors {
            let _ = writeln!(out, "    {class}: {count}");
        }
        if let Some(lost) = report.store_errors.get(name) {
            if *lost > 0 {
                let _ = writeln!(out, "    unrecorded (store errors): {lost}");
            }
        }
    }
    for (name, lost) in &report.store_errors {
        if *lost > 0 && !report.services.contains_key(name) {
            let _ = writeln!(
                out,
                "  {name}: no recorded requests, {lost} lost to store errors"
            );
        }
    }
    out
}
