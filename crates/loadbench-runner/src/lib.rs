//! Load generation engine.
//!
//! Drives concurrent clients against service probes at a fixed target
//! rate, records exactly one metric per invocation through the
//! interceptor, and orchestrates the service runs of a benchmark plan.

mod generator;
mod interceptor;
mod run;

pub use generator::{run_service, ServiceRunStats};
pub use interceptor::{MetricsInterceptor, Observation};
pub use run::{BenchmarkRunner, RunOutcome, ServiceOutcome, ServiceStatus};
