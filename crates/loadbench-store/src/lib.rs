//! Durable, append-only storage for request metrics.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryMetricsStore;
pub use sqlite::{SqliteMetricsStore, SqliteStoreOptions};
pub use traits::MetricsStore;
