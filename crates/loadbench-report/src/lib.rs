//! Report generation: deterministic aggregation of recorded metrics,
//! JSON artifacts, and optional Prometheus exposition.

mod aggregate;
mod exposition;
mod reporter;

pub use aggregate::{
    aggregate, AggregateReport, Percentiles, ServiceReport, Summary, Timing,
};
pub use exposition::MetricsExposition;
pub use reporter::{render_text, write_report};
