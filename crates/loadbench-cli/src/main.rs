use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use loadbench_core::{BenchConfig, BenchmarkPlan, LoggingConfig};
use loadbench_report::{aggregate, render_text, write_report, MetricsExposition};
use loadbench_runner::{BenchmarkRunner, RunOutcome, ServiceStatus};
use loadbench_store::{MetricsStore, SqliteMetricsStore, SqliteStoreOptions};

#[derive(Parser, Debug)]
#[command(name = "loadbench")]
#[command(about = "Load-testing benchmark engine for AI infrastructure services", long_about = None)]
#[command(version)]
struct Cli {
    /// Benchmark plan file (YAML, TOML or JSON)
    #[arg(short, long, env = "LOADBENCH_PLAN")]
    plan: PathBuf,

    /// Framework config file (defaults to ./loadbench.{yaml,toml})
    #[arg(short, long, env = "LOADBENCH_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite metrics database path (overrides config)
    #[arg(long, env = "LOADBENCH_STORE_PATH")]
    store: Option<String>,

    /// Report artifact directory (overrides config)
    #[arg(long, env = "LOADBENCH_ARTIFACT_DIR")]
    artifact_dir: Option<String>,

    /// Run services concurrently in a bounded pool
    #[arg(long)]
    parallel: bool,

    /// Bound on concurrently running services (implies --parallel)
    #[arg(long)]
    max_concurrent_services: Option<usize>,

    /// Pushgateway-style endpoint to push metrics to after the run
    #[arg(long, env = "LOADBENCH_PUSH_ENDPOINT")]
    push_endpoint: Option<String>,

    /// Write the Prometheus exposition text to this file
    #[arg(long)]
    export_file: Option<PathBuf>,
}

impl Cli {
    fn apply_to(&self, config: &mut BenchConfig) {
        if let Some(path) = &self.store {
            config.store.path = path.clone();
        }
        if let Some(dir) = &self.artifact_dir {
            config.report.artifact_dir = dir.clone();
        }
        if self.parallel {
            config.run.parallel = true;
        }
        if let Some(bound) = self.max_concurrent_services {
            config.run.parallel = true;
            config.run.max_concurrent_services = bound;
        }
        if let Some(endpoint) = &self.push_endpoint {
            config.report.push_endpoint = Some(endpoint.clone());
        }
    }
}

fn init_logging(logging: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let mut config =
        BenchConfig::load(cli.config.as_deref()).context("loading configuration")?;
    cli.apply_to(&mut config);
    config.validate().context("validating configuration")?;

    init_logging(&config.logging);

    let plan = BenchmarkPlan::load(&cli.plan).context("loading benchmark plan")?;
    info!(plan = %cli.plan.display(), services = plan.services.len(), "loaded benchmark plan");

    let store = SqliteMetricsStore::connect(SqliteStoreOptions::from(&config.store))
        .await
        .context("opening metrics store")?;
    let store: Arc<dyn MetricsStore> = Arc::new(store);

    let (abort_tx, abort_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, draining in-flight requests");
            let _ = abort_tx.send(true);
        }
    });

    let runner = BenchmarkRunner::new(Arc::clone(&store), config.run.clone());
    let outcome = runner.execute(&plan, abort_rx).await?;
    report_rejections(&outcome);

    let metrics = store.fetch(outcome.benchmark_id).await?;
    let mut report = aggregate(outcome.benchmark_id, Utc::now(), &metrics);
    report.store_errors = outcome.store_error_counts();

    let lost = outcome.total_store_errors();
    if lost > 0 {
        warn!(lost, "some request metrics could not be persisted; counts below are incomplete");
    }

    let artifact = write_report(&report, config.report.artifact_dir.as_ref())
        .await
        .context("writing report artifact")?;

    // The JSON artifact above is the primary output; exports after this
    // point are best effort and never fail the run.
    if config.report.push_endpoint.is_some() || cli.export_file.is_some() {
        match MetricsExposition::new() {
            Ok(exposition) => {
                exposition.record_all(&metrics);
                if let Some(endpoint) = &config.report.push_endpoint {
                    if let Err(err) = exposition.push(endpoint).await {
                        warn!(endpoint, error = %err, "metrics push failed");
                    }
                }
                if let Some(path) = &cli.export_file {
                    match exposition.encode() {
                        Ok(text) => {
                            if let Err(err) = tokio::fs::write(path, text).await {
                                warn!(path = %path.display(), error = %err, "metrics export failed");
                            }
                        }
                        Err(err) => warn!(error = %err, "metrics encoding failed"),
                    }
                }
            }
            Err(err) => warn!(error = %err, "building metrics exposition failed"),
        }
    }

    println!("{}", render_text(&report));
    println!("report: {}", artifact.display());

    if outcome.all_services_succeeded() {
        Ok(ExitCode::SUCCESS)
    } else {
        warn!("at least one service recorded no successful request");
        Ok(ExitCode::FAILURE)
    }
}

fn report_rejections(outcome: &RunOutcome) {
    for service in &outcome.services {
        match &service.status {
            ServiceStatus::Rejected { reason } => {
                warn!(service = %service.service_name, %reason, "spec rejected");
            }
            ServiceStatus::Failed { reason } => {
                warn!(service = %service.service_name, %reason, "run failed");
            }
            ServiceStatus::Completed(_) => {}
        }
    }
}
