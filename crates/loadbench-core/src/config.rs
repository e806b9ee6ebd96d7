//! Framework configuration.
//!
//! Sources, in order of precedence:
//! 1. `LOADBENCH_`-prefixed environment variables (highest)
//! 2. Config file (explicit path or `./loadbench.{yaml,toml}`)
//! 3. Hardcoded defaults (lowest)

use std::path::Path;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{BenchError, BenchResult};

/// Root configuration for the benchmark engine.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Metrics store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Load-generator settings.
    #[serde(default)]
    pub run: RunConfig,

    /// Report artifact and export settings.
    #[serde(default)]
    pub report: ReportConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metrics store settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path (default: `metrics.db`).
    #[serde(default = "default_store_path")]
    pub path: String,

    /// Max connections in the pool (default: 8).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Append retry attempts before surfacing a store error (default: 5).
    #[serde(default = "default_append_retries")]
    pub append_retries: u32,

    /// Initial retry backoff in milliseconds, doubled per attempt
    /// (default: 50).
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

/// Load-generator settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunConfig {
    /// Run services concurrently instead of one at a time (default: false).
    #[serde(default)]
    pub parallel: bool,

    /// Bound on concurrently running services in parallel mode
    /// (default: 4).
    #[serde(default = "default_max_concurrent_services")]
    pub max_concurrent_services: usize,

    /// Grace window for draining in-flight requests, as a multiple of
    /// the configured duration (default: 2.0).
    #[serde(default = "default_grace_multiplier")]
    pub grace_multiplier: f64,
}

/// Report artifact and export settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Directory for report artifacts (default: `reports`).
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: String,

    /// Optional Pushgateway-style endpoint for metrics push.
    #[serde(default)]
    pub push_endpoint: Option<String>,
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error (default: `info`).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: `pretty` or `json` (default: `pretty`).
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl BenchConfig {
    /// Loads configuration from defaults, an optional file, and
    /// `LOADBENCH_`-prefixed environment variables.
    ///
    /// Example override: `LOADBENCH_RUN__MAX_CONCURRENT_SERVICES=8`.
    pub fn load(path: Option<&Path>) -> BenchResult<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        } else {
            builder = builder.add_source(File::with_name("./loadbench").required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix("LOADBENCH")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder
            .build()
            .map_err(|err| BenchError::config(format!("failed to read config: {err}")))?
            .try_deserialize()
            .map_err(|err| BenchError::config(format!("failed to parse config: {err}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field constraints.
    pub fn validate(&self) -> BenchResult<()> {
        if self.run.max_concurrent_services == 0 {
            return Err(BenchError::config(
                "run.max_concurrent_services must be at least 1",
            ));
        }
        if !self.run.grace_multiplier.is_finite() || self.run.grace_multiplier < 1.0 {
            return Err(BenchError::config(
                "run.grace_multiplier must be at least 1.0",
            ));
        }
        if self.store.max_connections == 0 {
            return Err(BenchError::config("store.max_connections must be at least 1"));
        }
        Ok(())
    }

}

impl RunConfig {
    /// Effective bound on concurrently running services: 1 in
    /// sequential mode, the configured cap otherwise.
    #[must_use]
    pub fn service_concurrency(&self) -> usize {
        if self.parallel {
            self.max_concurrent_services
        } else {
            1
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            max_connections: default_max_connections(),
            append_retries: default_append_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            max_concurrent_services: default_max_concurrent_services(),
            grace_multiplier: default_grace_multiplier(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            artifact_dir: default_artifact_dir(),
            push_endpoint: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_store_path() -> String {
    "metrics.db".to_string()
}

fn default_max_connections() -> u32 {
    8
}

fn default_append_retries() -> u32 {
    5
}

fn default_retry_backoff_ms() -> u64 {
    50
}

fn default_max_concurrent_services() -> usize {
    4
}

fn default_grace_multiplier() -> f64 {
    2.0
}

fn default_artifact_dir() -> String {
    "reports".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
