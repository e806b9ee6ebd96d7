//! Service probes: protocol-specific request issuers.
//!
//! A probe performs exactly one operation against the service under
//! test per invocation and reports the outcome. The load generator and
//! the metrics interceptor depend only on the [`ServiceProbe`] trait,
//! never on concrete kinds.

mod file_storage;
mod inference;
mod object_storage;
mod relational;
mod vector_db;

use std::sync::Arc;

use async_trait::async_trait;

use loadbench_core::{BenchResult, ServiceRunSpec, ServiceTarget};

pub use file_storage::FileStorageProbe;
pub use inference::InferenceProbe;
pub use object_storage::ObjectStorageProbe;
pub use relational::RelationalDbProbe;
pub use vector_db::VectorDbProbe;

/// Outcome of one successful probe invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// HTTP status or operation-specific result code.
    pub status_code: Option<String>,
    /// Bytes transferred (or rows/objects touched, scaled per kind).
    pub bytes: u64,
}

impl ProbeOutcome {
    /// Outcome tagged with an HTTP status code.
    #[must_use]
    pub fn http(status: u16, bytes: u64) -> Self {
        Self {
            status_code: Some(status.to_string()),
            bytes,
        }
    }

    /// Outcome tagged with an operation name as result code.
    #[must_use]
    pub fn op(name: &str, bytes: u64) -> Self {
        Self {
            status_code: Some(name.to_string()),
            bytes,
        }
    }
}

/// One protocol-specific request issuer.
///
/// Implementations classify their own failures into the error taxonomy
/// (connection/timeout/protocol) so the interceptor can record them
/// without knowing the protocol.
#[async_trait]
pub trait ServiceProbe: Send + Sync {
    /// Name of the service this probe is bound to.
    fn service_name(&self) -> &str;

    /// One-time preparation before clients start (create the bench
    /// table, scratch directory, ...). Default: nothing to do.
    async fn setup(&self) -> BenchResult<()> {
        Ok(())
    }

    /// Performs exactly one operation against the service.
    async fn call(&self) -> BenchResult<ProbeOutcome>;
}

/// Builds the probe matching a service run spec.
pub fn build_probe(spec: &ServiceRunSpec) -> BenchResult<Arc<dyn ServiceProbe>> {
    let probe: Arc<dyn ServiceProbe> = match &spec.target {
        ServiceTarget::Inference { .. } => Arc::new(InferenceProbe::from_spec(spec)?),
        ServiceTarget::VectorDb { .. } => Arc::new(VectorDbProbe::from_spec(spec)?),
        ServiceTarget::RelationalDb { .. } => Arc::new(RelationalDbProbe::from_spec(spec)?),
        ServiceTarget::ObjectStorage { .. } => Arc::new(ObjectStorageProbe::from_spec(spec)?),
        ServiceTarget::FileStorage { .. } => Arc::new(FileStorageProbe::from_spec(spec)?),
    };
    Ok(probe)
}

#[cfg(test)]
mod tests {
    use loadbench_core::{InferenceFlavor, OperationMix};

    use super::*;

    fn spec_for(target: ServiceTarget) -> ServiceRunSpec {
        ServiceRunSpec {
            service_name: "probe-under-test".to_string(),
            client_count: 1,
            requests_per_second: 1.0,
            duration_secs: 1.0,
            request_timeout_secs: 5,
            target,
        }
    }

    #[test]
    fn factory_dispatches_on_target_kind() {
        let spec = spec_for(ServiceTarget::Inference {
            endpoint: "http://localhost:11434".to_string(),
            model: "llama2".to_string(),
            flavor: InferenceFlavor::Ollama,
            prompt: "hi".to_string(),
            max_tokens: 10,
        });
        let probe = build_probe(&spec).unwrap();
        assert_eq!(probe.service_name(), "probe-under-test");

        let spec = spec_for(ServiceTarget::FileStorage {
            root_dir: std::env::temp_dir().join("loadbench-factory-test"),
            file_size_bytes: 64,
            operation_mix: OperationMix::new(&[("write", 1.0)]),
        });
        assert!(build_probe(&spec).is_ok());
    }
}
