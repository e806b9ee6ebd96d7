use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use loadbench_core::{BenchError, BenchResult, InferenceFlavor, ServiceRunSpec, ServiceTarget};

use crate::{ProbeOutcome, ServiceProbe};

/// Probe for LLM inference endpoints (Ollama, vLLM, OpenAI-compatible).
pub struct InferenceProbe {
    service_name: String,
    client: reqwest::Client,
    url: String,
    body: Value,
}

impl InferenceProbe {
    /// Builds the probe from an inference spec.
    pub fn from_spec(spec: &ServiceRunSpec) -> BenchResult<Self> {
        let ServiceTarget::Inference {
            endpoint,
            model,
            flavor,
            prompt,
            max_tokens,
        } = &spec.target
        else {
            return Err(BenchError::config("spec is not an inference target"));
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(spec.request_timeout_secs))
            .build()
            .map_err(|err| BenchError::config(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            service_name: spec.service_name.clone(),
            client,
            url: request_url(endpoint, *flavor),
            body: request_body(*flavor, model, prompt, *max_tokens),
        })
    }
}

/// Completion URL for a flavor, relative to the service endpoint.
fn request_url(endpoint: &str, flavor: InferenceFlavor) -> String {
    let base = endpoint.trim_end_matches('/');
    match flavor {
        InferenceFlavor::Ollama => format!("{base}/api/generate"),
        InferenceFlavor::Vllm => format!("{base}/v1/completions"),
        InferenceFlavor::OpenAi => format!("{base}/v1/chat/completions"),
    }
}

/// Request body shape per flavor.
fn request_body(flavor: InferenceFlavor, model: &str, prompt: &str, max_tokens: u32) -> Value {
    match flavor {
        InferenceFlavor::Ollama => json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
        }),
        InferenceFlavor::Vllm => json!({
            "model": model,
            "prompt": prompt,
            "max_tokens": max_tokens,
        }),
        InferenceFlavor::OpenAi => json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": max_tokens,
        }),
    }
}

fn classify_reqwest(err: reqwest::Error) -> BenchError {
    if err.is_timeout() {
        BenchError::timeout(err.to_string())
    } else if err.is_connect() {
        BenchError::connection(err.to_string())
    } else if err.status().is_some() {
        BenchError::protocol(err.to_string())
    } else {
        BenchError::connection(err.to_string())
    }
}

#[async_trait]
impl ServiceProbe for InferenceProbe {
    fn service_name(&self) -> &str {
        &self.service_name
    }

    async fn call(&self) -> BenchResult<ProbeOutcome> {
        let response = self
            .client
            .post(&self.url)
            .json(&self.body)
            .send()
            .await
            .map_err(classify_reqwest)?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(classify_reqwest)?;

        if !status.is_success() {
            return Err(BenchError::protocol(format!(
                "{} returned {status}",
                self.url
            )));
        }

        Ok(ProbeOutcome::http(status.as_u16(), bytes.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_follows_flavor() {
        assert_eq!(
            request_url("http://host:11434/", InferenceFlavor::Ollama),
            "http://host:11434/api/generate"
        );
        assert_eq!(
            request_url("http://host:8000", InferenceFlavor::Vllm),
            "http://host:8000/v1/completions"
        );
        assert_eq!(
            request_url("http://host", InferenceFlavor::OpenAi),
            "http://host/v1/chat/completions"
        );
    }

    #[test]
    fn ollama_body_disables_streaming() {
        let body = request_body(InferenceFlavor::Ollama, "llama2", "hi", 10);
        assert_eq!(body["stream"], false);
        assert_eq!(body["model"], "llama2");
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn openai_body_wraps_prompt_in_messages() {
        let body = request_body(InferenceFlavor::OpenAi, "gpt-4o-mini", "hello", 64);
        assert_eq!(body["messages"][0]["content"], "hello");
        assert_eq!(body["max_tokens"], 64);
    }
}
