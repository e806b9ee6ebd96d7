use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canonical error type for the benchmark engine.
#[derive(Debug, Error)]
pub enum BenchError {
    /// The service under test could not be reached (refused/reset).
    #[error("connection error: {message}")]
    Connection {
        /// Human-readable connection failure detail.
        message: String,
    },

    /// A probe exceeded its per-request or grace-period bound.
    #[error("timeout: {message}")]
    Timeout {
        /// Human-readable timeout detail.
        message: String,
    },

    /// The service was reachable but returned an error-shaped response.
    #[error("protocol error: {message}")]
    Protocol {
        /// Human-readable protocol failure detail (status, query error, ...).
        message: String,
    },

    /// The metrics store could not durably record an observation.
    #[error("store error: {message}")]
    Store {
        /// Human-readable store failure detail.
        message: String,
    },

    /// A benchmark plan or service spec is structurally invalid.
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable validation failure detail.
        message: String,
    },

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl BenchError {
    /// Creates a `Connection` variant.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a `Timeout` variant.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Creates a `Protocol` variant.
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a `Store` variant.
    #[must_use]
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Creates a `Config` variant.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Maps this error to the classification recorded on a failed metric.
    ///
    /// Everything that is not a connection, timeout or store failure is
    /// treated as a protocol/application error: the request reached
    /// something, it just did not succeed.
    #[must_use]
    pub fn classify(&self) -> ErrorClass {
        match self {
            Self::Connection { .. } => ErrorClass::Connection,
            Self::Timeout { .. } => ErrorClass::Timeout,
            Self::Store { .. } => ErrorClass::Store,
            _ => ErrorClass::Protocol,
        }
    }
}

impl From<serde_json::Error> for BenchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Fixed failure taxonomy stamped on failed request metrics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Service unreachable.
    #[serde(rename = "connection error")]
    Connection,
    /// Per-request or grace-period bound exceeded.
    #[serde(rename = "timeout")]
    Timeout,
    /// Error-shaped response from a reachable service.
    #[serde(rename = "protocol error")]
    Protocol,
    /// The framework failed to record the observation.
    #[serde(rename = "store error")]
    Store,
}

impl ErrorClass {
    /// Stable string form persisted in the metrics store.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connection => "connection error",
            Self::Timeout => "timeout",
            Self::Protocol => "protocol error",
            Self::Store => "store error",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorClass {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connection error" => Ok(Self::Connection),
            "timeout" => Ok(Self::Timeout),
            "protocol error" => Ok(Self::Protocol),
            "store error" => Ok(Self::Store),
            other => Err(BenchError::Serialization(format!(
                "unknown error class `{other}`"
            ))),
        }
    }
}

/// Convenient result alias for benchmark operations.
pub type BenchResult<T> = Result<T, BenchError>;
