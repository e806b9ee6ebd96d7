//! Core domain types for the loadbench execution engine.

pub mod config;
pub mod error;
pub mod ids;
pub mod metric;
pub mod plan;

pub use config::{BenchConfig, LoggingConfig, ReportConfig, RunConfig, StoreConfig};
pub use error::{BenchError, BenchResult, ErrorClass};
pub use ids::BenchmarkId;
pub use metric::RequestMetric;
pub use plan::{
    BenchmarkPlan, InferenceFlavor, OperationMix, ServiceKind, ServiceRunSpec, ServiceTarget,
};
