//! Offline generation engines.
//!
//! - [`MockEngine`] plays both stages of the recall game without a model: the
//!   first call of each pair answers every query with a canned continuation,
//!   the second with a seeded guess from the secret alphabet.
//! - [`ScriptedEngine`] replays per-call responses supplied up front and is
//!   what the collector tests drive the pipeline with.
//!
//! Both fabricate log-probabilities, reference log-probabilities, and values
//! (one entry per response token) and report the same stats keys on every
//! call, so their results merge like a real engine's.

use std::collections::VecDeque;

use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::experience::sampler::SecretAlphabet;

use super::codec::{TextCodec, TokenBatch};
use super::engine::{GenerationEngine, GenerationResult, StatsMap};

/// Log-probability assigned to every response token by the mock policy.
const MOCK_LOGPROB: f64 = -1.0;
/// Log-probability assigned to every response token by the mock reference.
const MOCK_REF_LOGPROB: f64 = -1.1;

/// Default stage-1 continuation of the mock engine.
pub const DEFAULT_CONTINUATION: &str = " sun rises softly over the quiet hill";

/// Assemble a [`GenerationResult`] and its stats from queries and responses.
fn score_responses(queries: &TokenBatch, responses: TokenBatch) -> (GenerationResult, StatsMap) {
    let n = queries.len();
    let mut result = GenerationResult {
        query_tensors: queries.sequences.clone(),
        response_tensors: Vec::with_capacity(n),
        samples: Vec::with_capacity(n),
        logprobs: Vec::with_capacity(n),
        ref_logprobs: Vec::with_capacity(n),
        values: Vec::with_capacity(n),
    };

    let mut response_tokens = 0usize;
    for (query, response) in queries.sequences.iter().zip(responses.sequences) {
        let len = response.len();
        response_tokens += len;

        let mut sample = query.clone();
        sample.extend_from_slice(&response);

        result.samples.push(sample);
        result.response_tensors.push(response);
        result.logprobs.push(vec![MOCK_LOGPROB; len]);
        result.ref_logprobs.push(vec![MOCK_REF_LOGPROB; len]);
        result.values.push(vec![0.0; len]);
    }

    let kl = if response_tokens == 0 {
        0.0
    } else {
        MOCK_LOGPROB - MOCK_REF_LOGPROB
    };

    let mut stats = StatsMap::new();
    stats.insert("exp/batch_size".into(), n as f64);
    stats.insert(
        "exp/mean_response_len".into(),
        response_tokens as f64 / n.max(1) as f64,
    );
    stats.insert("exp/kl".into(), kl);
    stats.insert(
        "exp/sum_logprob".into(),
        MOCK_LOGPROB * response_tokens as f64,
    );

    (result, stats)
}

// ---------------------------------------------------------------------------
// Mock engine
// ---------------------------------------------------------------------------

/// Model-free engine that alternates between continuation and recall answers.
///
/// The stage is inferred from call parity alone. A step that fails between its
/// two calls leaves the engine mid-pair; call [`MockEngine::reset`] before
/// reusing it for another step.
pub struct MockEngine<C> {
    codec: C,
    continuation: String,
    alphabet: SecretAlphabet,
    rng: StdRng,
    calls: usize,
}

impl<C: TextCodec> MockEngine<C> {
    /// Create a mock whose guesses are drawn from `alphabet` with `seed`.
    pub fn new(codec: C, alphabet: SecretAlphabet, seed: u64) -> Self {
        Self {
            codec,
            continuation: DEFAULT_CONTINUATION.to_string(),
            alphabet,
            rng: StdRng::seed_from_u64(seed),
            calls: 0,
        }
    }

    /// Replace the canned stage-1 continuation.
    pub fn with_continuation(mut self, continuation: impl Into<String>) -> Self {
        self.continuation = continuation.into();
        self
    }

    /// Start over at a continuation call, as at the beginning of a step.
    pub fn reset(&mut self) {
        self.calls = 0;
    }

    /// Whether the next call answers with the canned continuation.
    pub fn expects_continuation(&self) -> bool {
        self.calls % 2 == 0
    }

    /// Number of `generate_and_score` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl<C: TextCodec> GenerationEngine for MockEngine<C> {
    async fn generate_and_score(
        &mut self,
        batch: &TokenBatch,
    ) -> Result<(GenerationResult, StatsMap)> {
        let continuation_call = self.expects_continuation();
        self.calls += 1;

        let texts: Vec<String> = if continuation_call {
            vec![self.continuation.clone(); batch.len()]
        } else {
            self.alphabet
                .sample(&mut self.rng, batch.len())
                .into_iter()
                .map(|guess| format!(" {guess}"))
                .collect()
        };

        let responses = self.codec.encode(&texts)?;
        debug!(
            call = self.calls,
            batch_size = batch.len(),
            continuation_call,
            "mock engine generated responses"
        );
        Ok(score_responses(batch, responses))
    }
}

// ---------------------------------------------------------------------------
// Scripted engine
// ---------------------------------------------------------------------------

/// Engine that replays a fixed response batch per call, in order.
#[derive(Debug, Clone, Default)]
pub struct ScriptedEngine {
    script: VecDeque<TokenBatch>,
}

impl ScriptedEngine {
    /// One token batch per expected call.
    pub fn new(calls: Vec<TokenBatch>) -> Self {
        Self {
            script: calls.into(),
        }
    }

    /// Encode one list of response strings per expected call.
    pub fn from_text<C: TextCodec>(codec: &C, calls: &[Vec<String>]) -> Result<Self> {
        let batches = calls
            .iter()
            .map(|texts| codec.encode(texts))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(batches))
    }

    /// Calls left in the script.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl GenerationEngine for ScriptedEngine {
    async fn generate_and_score(
        &mut self,
        batch: &TokenBatch,
    ) -> Result<(GenerationResult, StatsMap)> {
        let Some(responses) = self.script.pop_front() else {
            bail!("scripted engine exhausted");
        };
        if responses.len() != batch.len() {
            bail!(
                "scripted response batch has {} elements, query batch has {}",
                responses.len(),
                batch.len()
            );
        }
        Ok(score_responses(batch, responses))
    }
}
