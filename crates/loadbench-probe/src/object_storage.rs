use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use parking_lot::Mutex;
use rand::Rng;
use uuid::Uuid;

use loadbench_core::{BenchError, BenchResult, OperationMix, ServiceRunSpec, ServiceTarget};

use crate::{ProbeOutcome, ServiceProbe};

/// Probe for S3-compatible object storage.
///
/// Put/get/list/delete against a single bucket, drawn from the operation
/// mix. Uploaded keys are tracked in a shared ring so reads and deletes
/// hit real objects; with no live key those operations fall back to a put.
pub struct ObjectStorageProbe {
    service_name: String,
    store: Arc<dyn ObjectStore>,
    payload: Bytes,
    mix: OperationMix,
    keys: Mutex<Vec<ObjectPath>>,
}

impl ObjectStorageProbe {
    pub fn from_spec(spec: &ServiceRunSpec) -> BenchResult<Self> {
        let ServiceTarget::ObjectStorage {
            endpoint,
            bucket,
            region,
            access_key,
            secret_key,
            object_size_bytes,
            operation_mix,
        } = &spec.target
        else {
            return Err(BenchError::config("spec is not an object-storage target"));
        };

        let mut builder = AmazonS3Builder::new()
            .with_endpoint(endpoint)
            .with_bucket_name(bucket)
            .with_region(region)
            .with_allow_http(true);
        if let (Some(access), Some(secret)) = (access_key, secret_key) {
            builder = builder
                .with_access_key_id(access)
                .with_secret_access_key(secret);
        }
        let store = builder
            .build()
            .map_err(|err| BenchError::config(format!("invalid object store config: {err}")))?;

        Ok(Self {
            service_name: spec.service_name.clone(),
            store: Arc::new(store),
            payload: Bytes::from(vec![0x42u8; *object_size_bytes]),
            mix: operation_mix.clone(),
            keys: Mutex::new(Vec::new()),
        })
    }

    fn take_existing_key(&self) -> Option<ObjectPath> {
        let mut keys = self.keys.lock();
        if keys.is_empty() {
            return None;
        }
        let idx = rand::thread_rng().gen_range(0..keys.len());
        Some(keys.swap_remove(idx))
    }

    async fn put(&self) -> BenchResult<ProbeOutcome> {
        let key = ObjectPath::from(format!("bench/{}", Uuid::new_v4()));
        self.store
            .put(&key, PutPayload::from(self.payload.clone()))
            .await
            .map_err(classify)?;
        let bytes = self.payload.len() as u64;
        self.keys.lock().push(key);
        Ok(ProbeOutcome::op("put", bytes))
    }

    async fn get(&self) -> BenchResult<ProbeOutcome> {
        let Some(key) = self.take_existing_key() else {
            return self.put().await;
        };
        let result = self.store.get(&key).await.map_err(classify)?;
        let body = result.bytes().await.map_err(classify)?;
        self.keys.lock().push(key);
        Ok(ProbeOutcome::op("get", body.len() as u64))
    }

    async fn list(&self) -> BenchResult<ProbeOutcome> {
        let listing = self
            .store
            .list_with_delimiter(Some(&ObjectPath::from("bench")))
            .await
            .map_err(classify)?;
        Ok(ProbeOutcome::op("list", listing.objects.len() as u64))
    }

    async fn delete(&self) -> BenchResult<ProbeOutcome> {
        let Some(key) = self.take_existing_key() else {
            return self.put().await;
        };
        self.store.delete(&key).await.map_err(classify)?;
        Ok(ProbeOutcome::op("delete", 0))
    }
}

fn classify(err: object_store::Error) -> BenchError {
    match err {
        object_store::Error::NotFound { .. }
        | object_store::Error::AlreadyExists { .. }
        | object_store::Error::Precondition { .. }
        | object_store::Error::NotModified { .. } => BenchError::protocol(err.to_string()),
        other => BenchError::connection(other.to_string()),
    }
}

#[async_trait]
impl ServiceProbe for ObjectStorageProbe {
    fn service_name(&self) -> &str {
        &self.service_name
    }

    async fn call(&self) -> BenchResult<ProbeOutcome> {
        let op = {
            let mut rng = rand::thread_rng();
            self.mix.sample(&mut rng).to_string()
        };
        match op.as_str() {
            "put" => self.put().await,
            "get" => self.get().await,
            "list" => self.list().await,
            "delete" => self.delete().await,
            other => Err(BenchError::config(format!(
                "unsupported object-storage operation `{other}`"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe() -> ObjectStorageProbe {
        let spec = ServiceRunSpec {
            service_name: "minio".to_string(),
            client_count: 1,
            requests_per_second: 1.0,
            duration_secs: 1.0,
            request_timeout_secs: 5,
            target: ServiceTarget::ObjectStorage {
                endpoint: "http://localhost:9000".to_string(),
                bucket: "bench".to_string(),
                region: "us-east-1".to_string(),
                access_key: Some("minioadmin".to_string()),
                secret_key: Some("minioadmin".to_string()),
                object_size_bytes: 1024,
                operation_mix: OperationMix::new(&[("put", 1.0)]),
            },
        };
        ObjectStorageProbe::from_spec(&spec).unwrap()
    }

    #[test]
    fn payload_matches_configured_size() {
        assert_eq!(probe().payload.len(), 1024);
    }

    #[test]
    fn key_ring_hands_back_uploaded_keys() {
        let probe = probe();
        assert!(probe.take_existing_key().is_none());
        probe.keys.lock().push(ObjectPath::from("bench/obj-1"));
        let key = probe.take_existing_key().unwrap();
        assert_eq!(key.as_ref(), "bench/obj-1");
    }

    #[test]
    fn not_found_maps_to_protocol_error() {
        let err = classify(object_store::Error::NotFound {
            path: "bench/missing".to_string(),
            source: "gone".into(),
        });
        assert!(matches!(err, BenchError::Protocol { .. }));
    }
}
