use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use serde_json::{json, Value};
use uuid::Uuid;

use loadbench_core::{BenchError, BenchResult, OperationMix, ServiceRunSpec, ServiceTarget};

use crate::{ProbeOutcome, ServiceProbe};

/// Probe for vector databases exposing a Chroma-style REST API.
///
/// Draws insert/search/update/delete per invocation from the configured
/// operation mix. Inserted document ids are kept in a shared ring so
/// update/delete target live documents; when the ring is empty those
/// operations fall back to an insert.
pub struct VectorDbProbe {
    service_name: String,
    client: reqwest::Client,
    collection_url: String,
    dimension: usize,
    search_k: usize,
    mix: OperationMix,
    inserted_ids: Mutex<Vec<String>>,
}

impl VectorDbProbe {
    /// Builds the probe from a vector-db spec.
    pub fn from_spec(spec: &ServiceRunSpec) -> BenchResult<Self> {
        let ServiceTarget::VectorDb {
            endpoint,
            collection,
            dimension,
            search_k,
            operation_mix,
        } = &spec.target
        else {
            return Err(BenchError::config("spec is not a vector-db target"));
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(spec.request_timeout_secs))
            .build()
            .map_err(|err| BenchError::config(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            service_name: spec.service_name.clone(),
            client,
            collection_url: format!(
                "{}/api/v1/collections/{collection}",
                endpoint.trim_end_matches('/')
            ),
            dimension: *dimension,
            search_k: *search_k,
            mix: operation_mix.clone(),
            inserted_ids: Mutex::new(Vec::new()),
        })
    }

    fn random_embedding(&self) -> Vec<f32> {
        let mut rng = rand::thread_rng();
        (0..self.dimension)
            .map(|_| rng.gen_range(-1.0f32..1.0f32))
            .collect()
    }

    /// Pops a random live document id, if any.
    fn take_existing_id(&self) -> Option<String> {
        let mut ids = self.inserted_ids.lock();
        if ids.is_empty() {
            return None;
        }
        let idx = rand::thread_rng().gen_range(0..ids.len());
        Some(ids.swap_remove(idx))
    }

    async fn post(&self, path: &str, body: Value) -> BenchResult<ProbeOutcome> {
        let url = format!("{}/{path}", self.collection_url);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(classify)?;
        if !status.is_success() {
            return Err(BenchError::protocol(format!("{url} returned {status}")));
        }
        Ok(ProbeOutcome::http(status.as_u16(), bytes.len() as u64))
    }

    async fn insert(&self) -> BenchResult<ProbeOutcome> {
        let id = Uuid::new_v4().to_string();
        let body = json!({
            "ids": [id],
            "embeddings": [self.random_embedding()],
        });
        let outcome = self.post("add", body).await?;
        self.inserted_ids.lock().push(id);
        Ok(outcome)
    }

    async fn search(&self) -> BenchResult<ProbeOutcome> {
        let body = json!({
            "query_embeddings": [self.random_embedding()],
            "n_results": self.search_k,
        });
        self.post("query", body).await
    }

    async fn update(&self) -> BenchResult<ProbeOutcome> {
        let Some(id) = self.take_existing_id() else {
            return self.insert().await;
        };
        let body = json!({
            "ids": [id],
            "embeddings": [self.random_embedding()],
        });
        let outcome = self.post("update", body).await?;
        self.inserted_ids.lock().push(id);
        Ok(outcome)
    }

    async fn delete(&self) -> BenchResult<ProbeOutcome> {
        let Some(id) = self.take_existing_id() else {
            return self.insert().await;
        };
        self.post("delete", json!({ "ids": [id] })).await
    }
}

fn classify(err: reqwest::Error) -> BenchError {
    if err.is_timeout() {
        BenchError::timeout(err.to_string())
    } else if err.is_status() || err.is_decode() {
        BenchError::protocol(err.to_string())
    } else {
        BenchError::connection(err.to_string())
    }
}

#[async_trait]
impl ServiceProbe for VectorDbProbe {
    fn service_name(&self) -> &str {
        &self.service_name
    }

    async fn call(&self) -> BenchResult<ProbeOutcome> {
        let op = {
            let mut rng = rand::thread_rng();
            self.mix.sample(&mut rng).to_string()
        };
        match op.as_str() {
            "insert" => self.insert().await,
            "search" => self.search().await,
            "update" => self.update().await,
            "delete" => self.delete().await,
            other => Err(BenchError::config(format!(
                "unsupported vector operation `{other}`"
            ))),
        }
    }
}
