//! Generation-and-scoring engine interface.
//!
//! One call covers a whole batch: the engine samples a continuation for every
//! query and returns, per element, the token tensors, log-probabilities under
//! the trainable and the frozen reference policy, and value estimates. Element
//! `i` of the result always corresponds to element `i` of the input batch.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_len, PipelineResult};

use super::codec::{TokenBatch, TokenId};

/// Named numeric aggregates reported alongside one generation call.
pub type StatsMap = BTreeMap<String, f64>;

/// Everything the optimizer needs from one generation call, per element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    /// Tokens of each query fed to the engine.
    pub query_tensors: Vec<Vec<TokenId>>,
    /// Tokens sampled as each element's response.
    pub response_tensors: Vec<Vec<TokenId>>,
    /// Full sampled sequence (query followed by response).
    pub samples: Vec<Vec<TokenId>>,
    /// Per-token log-probabilities of the response under the current policy.
    pub logprobs: Vec<Vec<f64>>,
    /// Per-token log-probabilities of the response under the reference policy.
    pub ref_logprobs: Vec<Vec<f64>>,
    /// Per-token value estimates.
    pub values: Vec<Vec<f64>>,
}

impl GenerationResult {
    /// Batch size, taken from the query field.
    pub fn len(&self) -> usize {
        self.query_tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.query_tensors.is_empty()
    }

    /// Length of every per-element field, in declaration order.
    pub fn field_lengths(&self) -> [(&'static str, usize); 6] {
        [
            ("query_tensors", self.query_tensors.len()),
            ("response_tensors", self.response_tensors.len()),
            ("samples", self.samples.len()),
            ("logprobs", self.logprobs.len()),
            ("ref_logprobs", self.ref_logprobs.len()),
            ("values", self.values.len()),
        ]
    }

    /// Check that every field holds exactly `expected` elements.
    pub fn check_shape(&self, context: &'static str, expected: usize) -> PipelineResult<()> {
        for (field, len) in self.field_lengths() {
            ensure_len(context, field, expected, len)?;
        }
        Ok(())
    }

    /// Query tokens as a batch, for decoding.
    pub fn query_batch(&self) -> TokenBatch {
        TokenBatch::new(self.query_tensors.clone())
    }

    /// Response tokens as a batch, for decoding.
    pub fn response_batch(&self) -> TokenBatch {
        TokenBatch::new(self.response_tensors.clone())
    }
}

/// The external generation-and-scoring primitive.
///
/// Calls take `&mut self`: an engine serves one call at a time. Failures are
/// returned as-is and never retried by the caller; there is no deadline on a
/// call, so any timeout has to be enforced by the implementation or around it.
#[allow(async_fn_in_trait)]
pub trait GenerationEngine: Send + Sync {
    /// Sample and score a continuation for every query in `batch`.
    async fn generate_and_score(
        &mut self,
        batch: &TokenBatch,
    ) -> Result<(GenerationResult, StatsMap)>;
}
