//! HTTP client for a remote generation-and-scoring server.
//!
//! The server owns the policy and the frozen reference model. One request
//! carries a whole token batch; the response holds the sampled responses,
//! log-probabilities under both policies, value estimates, and a stats map.
//!
//! ```text
//! POST {api_base}/generate_and_score
//! { "model": "...", "queries": [[...], ...], "max_new_tokens": 32, "temperature": 1.0 }
//! -> { "result": { "query_tensors": ..., ... }, "stats": { "kl": 0.01, ... } }
//! ```

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::EngineConfig;

use super::codec::{TokenBatch, TokenId};
use super::engine::{GenerationEngine, GenerationResult, StatsMap};

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Body of a `generate_and_score` request.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest<'a> {
    /// Model identifier understood by the server.
    pub model: &'a str,
    /// One token sequence per batch element, in batch order.
    pub queries: &'a [Vec<TokenId>],
    /// Upper bound on sampled tokens per element.
    pub max_new_tokens: usize,
    /// Sampling temperature.
    pub temperature: f64,
}

/// Body of a successful `generate_and_score` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Per-element tensors, index-aligned with the request.
    pub result: GenerationResult,
    /// Aggregates for this call.
    #[serde(default)]
    pub stats: StatsMap,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// [`GenerationEngine`] backed by an HTTP server.
#[derive(Debug, Clone)]
pub struct HttpEngine {
    /// The base URL for API requests (e.g. `"http://localhost:8000/v1"`).
    pub api_base: String,
    /// The API key used for bearer authentication.
    pub api_key: String,
    /// Model identifier sent with every request.
    pub model_id: String,
    pub max_new_tokens: usize,
    pub temperature: f64,
    /// The underlying HTTP client.
    pub http: reqwest::Client,
}

impl HttpEngine {
    /// Build a client from the engine section of the configuration.
    ///
    /// Without `request_timeout_secs` a request may block indefinitely.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder.build().context("failed to build HTTP client")?;

        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model_id: config.model_id.clone(),
            max_new_tokens: config.max_new_tokens,
            temperature: config.temperature,
            http,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/generate_and_score", self.api_base)
    }
}

impl GenerationEngine for HttpEngine {
    async fn generate_and_score(
        &mut self,
        batch: &TokenBatch,
    ) -> Result<(GenerationResult, StatsMap)> {
        let url = self.endpoint();
        debug!(
            model = %self.model_id,
            batch_size = batch.len(),
            query_tokens = batch.total_tokens(),
            "sending generate_and_score request"
        );

        let body = GenerateRequest {
            model: &self.model_id,
            queries: &batch.sequences,
            max_new_tokens: self.max_new_tokens,
            temperature: self.temperature,
        };

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("failed to send generate_and_score request")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("generate_and_score API returned {status}: {text}");
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .context("failed to parse generate_and_score response")?;

        info!(
            model = %self.model_id,
            batch_size = parsed.result.len(),
            stats = parsed.stats.len(),
            "generate_and_score succeeded"
        );

        Ok((parsed.result, parsed.stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_config() -> EngineConfig {
        EngineConfig {
            api_base: "http://localhost:8000/v1/".into(),
            api_key: "secret".into(),
            model_id: "gpt2".into(),
            max_new_tokens: 16,
            temperature: 0.7,
            request_timeout_secs: Some(30),
        }
    }

    #[test]
    fn test_new_trims_trailing_slash() {
        let engine = HttpEngine::new(&engine_config()).unwrap();
        assert_eq!(engine.api_base, "http://localhost:8000/v1");
        assert_eq!(engine.endpoint(), "http://localhost:8000/v1/generate_and_score");
        assert_eq!(engine.max_new_tokens, 16);
    }

    #[test]
    fn test_request_serialization() {
        let queries = vec![vec![1, 2, 3], vec![4]];
        let req = GenerateRequest {
            model: "gpt2",
            queries: &queries,
            max_new_tokens: 8,
            temperature: 1.0,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "gpt2");
        assert_eq!(json["queries"][0][2], 3);
        assert_eq!(json["queries"].as_array().unwrap().len(), 2);
        assert_eq!(json["max_new_tokens"], 8);
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{
            "result": {
                "query_tensors": [[1, 2]],
                "response_tensors": [[3]],
                "samples": [[1, 2, 3]],
                "logprobs": [[-0.25]],
                "ref_logprobs": [[-0.5]],
                "values": [[0.1]]
            },
            "stats": {"kl": 0.25, "response_len": 1.0}
        }"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.result.len(), 1);
        assert!(parsed.result.check_shape("test", 1).is_ok());
        assert!((parsed.stats["kl"] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_response_without_stats() {
        let raw = r#"{"result": {
            "query_tensors": [], "response_tensors": [], "samples": [],
            "logprobs": [], "ref_logprobs": [], "values": []
        }}"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.result.is_empty());
        assert!(parsed.stats.is_empty());
    }
}
