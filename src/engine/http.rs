//! HTTP Engine Client
//!
//! [`InferenceEngine`] and [`Tokenizer`] implementation for a local batched
//! inference sidecar speaking a small JSON API:
//!
//! - `POST /v1/load` - construct model + tokenizer (warmup)
//! - `POST /v1/tokenize` - text to token strings
//! - `POST /v1/generate` - batch-of-one greedy decoding
//! - `POST /v1/score` - batched scoring (paired or joint request shape)
//! - `GET /v1/health` - liveness probe
//!
//! The sidecar owns weights, devices, and thread pools; this client only
//! moves token sequences and log-probabilities across the boundary.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::traits::{DecodingParams, EngineError, InferenceEngine, LoadSpec, Tokenizer};

/// Default per-request timeout. Generation dominates; scoring and
/// tokenization finish well inside it.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// HTTP client for the inference sidecar.
#[derive(Clone)]
pub struct HttpEngine {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpEngine {
    /// Create a client against `base_url` (e.g. `http://127.0.0.1:9920`).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Unavailable`] if the underlying HTTP client
    /// cannot be constructed.
    pub fn new(base_url: impl Into<String>) -> Result<Self, EngineError> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Check that the sidecar is up.
    pub async fn health_check(&self) -> bool {
        self.http_client
            .get(self.url("/v1/health"))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    /// POST `body` to `path` and return the decoded JSON payload.
    async fn post(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, EngineError> {
        let response = self
            .http_client
            .post(self.url(path))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Status { status, body });
        }

        Ok(response.json().await?)
    }
}

/// Pull a `Vec<Vec<f64>>` out of a scoring response.
fn extract_log_probs(data: &serde_json::Value) -> Result<Vec<Vec<f64>>, EngineError> {
    data.get("log_probs")
        .and_then(serde_json::Value::as_array)
        .map(|rows| {
            rows.iter()
                .map(|row| {
                    row.as_array()
                        .map(|values| {
                            values
                                .iter()
                                .filter_map(serde_json::Value::as_f64)
                                .collect::<Vec<f64>>()
                        })
                        .ok_or(EngineError::MalformedResponse("log_probs"))
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .ok_or(EngineError::MalformedResponse("log_probs"))?
}

#[async_trait]
impl Tokenizer for HttpEngine {
    async fn tokenize(&self, text: &str) -> Result<Vec<String>, EngineError> {
        let data = self.post("/v1/tokenize", json!({ "text": text })).await?;

        data.get("tokens")
            .and_then(serde_json::Value::as_array)
            .map(|tokens| {
                tokens
                    .iter()
                    .filter_map(|t| t.as_str().map(str::to_string))
                    .collect()
            })
            .ok_or(EngineError::MalformedResponse("tokens"))
    }
}

#[async_trait]
impl InferenceEngine for HttpEngine {
    async fn load(&self, spec: &LoadSpec) -> Result<(), EngineError> {
        tracing::info!(model = %spec.model_id, "Loading model on engine");

        self.post(
            "/v1/load",
            json!({
                "model": spec.model_id,
                "tokenizer": spec.tokenizer_id,
                "intra_threads": spec.intra_threads,
                "inter_threads": spec.inter_threads,
            }),
        )
        .await
        .map_err(|e| EngineError::Unavailable(e.to_string()))?;

        Ok(())
    }

    async fn generate(
        &self,
        tokens: &[String],
        params: &DecodingParams,
    ) -> Result<String, EngineError> {
        let data = self
            .post(
                "/v1/generate",
                json!({
                    "tokens": tokens,
                    "max_length": params.max_tokens,
                    "beam_size": params.beam_size,
                    "repetition_penalty": params.repetition_penalty,
                    "include_prompt": params.include_prompt,
                }),
            )
            .await?;

        data.get("text")
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .ok_or(EngineError::MalformedResponse("text"))
    }

    async fn score_paired(
        &self,
        sources: &[Vec<String>],
        targets: &[Vec<String>],
    ) -> Result<Vec<Vec<f64>>, EngineError> {
        let data = self
            .post(
                "/v1/score",
                json!({ "sources": sources, "targets": targets }),
            )
            .await?;

        extract_log_probs(&data)
    }

    async fn score_joint(&self, sequences: &[Vec<String>]) -> Result<Vec<Vec<f64>>, EngineError> {
        let data = self
            .post("/v1/score", json!({ "sequences": sequences }))
            .await?;

        extract_log_probs(&data)
    }
}
