//! Experience collection: one training step of the recall game.
//!
//! The [`ExperienceCollector`] drives a batch through both stages:
//!   1. sample one secret per element,
//!   2. compose, encode, generate, and decode stage 1,
//!   3. compose stage 2 from each element's decoded stage-1 output, then
//!      encode, generate, and decode it,
//!   4. zip everything into trajectories, merge the two engine results, and
//!      score each trajectory.
//!
//! Each stage is a single engine call covering the whole batch, and stage 2
//! cannot start before stage 1 is decoded. Every collaborator output is
//! checked against the batch size before it is used.

use tracing::{debug, info, warn};

use crate::error::{ensure_len, PipelineResult};
use crate::model::codec::{DecodedBatch, TextCodec};
use crate::model::engine::{GenerationEngine, GenerationResult, StatsMap};
use crate::model::prompt::PromptTemplates;
use crate::trajectory::types::{Reward, Secret, Trajectory};
use crate::trajectory::{reconstruct_trajectories, reward_fn};

use super::merge::{merge_results, merge_stats};
use super::sampler::{SecretAlphabet, SecretSampler};

/// Everything one step produces.
#[derive(Debug, Clone, Default)]
pub struct Experience {
    /// The secret of each element, in batch order.
    pub secrets: Vec<Secret>,
    /// One trajectory per element (`n`).
    pub trajectories: Vec<Trajectory>,
    /// Both stages' engine results, stage 1 first (`2n` rows).
    pub data: GenerationResult,
    /// Key-wise sum of both stages' stats.
    pub stats: StatsMap,
    /// One reward per trajectory (`n`).
    pub rewards: Vec<Reward>,
}

impl Experience {
    /// Number of trajectories (the batch size of the step).
    pub fn len(&self) -> usize {
        self.trajectories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trajectories.is_empty()
    }

    /// Mean reward over the batch (0.0 when empty).
    pub fn mean_reward(&self) -> f64 {
        if self.rewards.is_empty() {
            return 0.0;
        }
        self.rewards.iter().sum::<f64>() / self.rewards.len() as f64
    }
}

/// One stage's raw engine output together with its decoded text.
struct StageOutput {
    result: GenerationResult,
    stats: StatsMap,
    decoded: DecodedBatch,
}

/// Builds two-stage experience for batches of base prompts.
#[derive(Debug, Clone)]
pub struct ExperienceCollector {
    templates: PromptTemplates,
    alphabet: SecretAlphabet,
    seed: u64,
}

impl ExperienceCollector {
    /// Create a collector.
    ///
    /// * `templates` -- stage-1 and stage-2 prompt templates.
    /// * `alphabet` -- inclusive range secrets are drawn from.
    /// * `seed` -- base seed; each step derives its own generator from it.
    pub fn new(templates: PromptTemplates, alphabet: SecretAlphabet, seed: u64) -> Self {
        Self {
            templates,
            alphabet,
            seed,
        }
    }

    pub fn templates(&self) -> &PromptTemplates {
        &self.templates
    }

    /// The secrets step `step` draws for a batch of `n` elements.
    pub fn secrets_for_step(&self, step: u64, n: usize) -> Vec<Secret> {
        SecretSampler::for_step(self.alphabet, self.seed, step).sample(n)
    }

    /// Run both stages over `prompts` and return the scored experience.
    ///
    /// Any collaborator error aborts the step unchanged; misaligned batch
    /// sizes abort it with a shape mismatch. An empty batch yields an empty
    /// experience without touching the engine.
    pub async fn collect<C, E>(
        &self,
        codec: &C,
        engine: &mut E,
        step: u64,
        prompts: &[String],
    ) -> PipelineResult<Experience>
    where
        C: TextCodec,
        E: GenerationEngine,
    {
        let n = prompts.len();
        if n == 0 {
            warn!(step, "empty prompt batch, skipping generation");
            return Ok(Experience::default());
        }

        let secrets = self.secrets_for_step(step, n);

        // Stage 1: state the secret and ask for a continuation.
        let stage1_prompts: Vec<String> = secrets
            .iter()
            .zip(prompts)
            .map(|(&secret, prompt)| self.templates.compose_stage1(secret, prompt))
            .collect();
        let first = self
            .run_stage(codec, engine, &stage1_prompts, "stage 1")
            .await?;

        // Stage 2: replay the continuation and ask for the secret.
        let stage2_prompts: Vec<String> = prompts
            .iter()
            .zip(&first.decoded.outputs)
            .map(|(prompt, output)| self.templates.compose_stage2(prompt, output))
            .collect();
        let second = self
            .run_stage(codec, engine, &stage2_prompts, "stage 2")
            .await?;

        let trajectories = reconstruct_trajectories(
            &secrets,
            &first.decoded.prompts,
            &first.decoded.outputs,
            &second.decoded.prompts,
            &second.decoded.outputs,
        )?;

        let stats = merge_stats(&first.stats, &second.stats)?;
        let data = merge_results(first.result, second.result)?;
        let rewards = reward_fn(&trajectories);

        let experience = Experience {
            secrets,
            trajectories,
            data,
            stats,
            rewards,
        };

        info!(
            step,
            batch_size = n,
            merged_rows = experience.data.len(),
            mean_reward = experience.mean_reward(),
            "collected experience"
        );

        Ok(experience)
    }

    /// Encode, generate, and decode one stage, checking sizes at each hop.
    async fn run_stage<C, E>(
        &self,
        codec: &C,
        engine: &mut E,
        prompts: &[String],
        stage: &'static str,
    ) -> PipelineResult<StageOutput>
    where
        C: TextCodec,
        E: GenerationEngine,
    {
        let n = prompts.len();

        let batch = codec.encode(prompts)?;
        ensure_len(stage, "encoded queries", n, batch.len())?;

        let (result, stats) = engine.generate_and_score(&batch).await?;
        result.check_shape(stage, n)?;

        let decoded = codec.decode(&result.query_batch(), &result.response_batch())?;
        ensure_len(stage, "decoded prompts", n, decoded.prompts.len())?;
        ensure_len(stage, "decoded outputs", n, decoded.outputs.len())?;

        debug!(
            stage,
            batch_size = n,
            query_tokens = batch.total_tokens(),
            response_tokens = result.response_tensors.iter().map(Vec::len).sum::<usize>(),
            "stage complete"
        );

        Ok(StageOutput {
            result,
            stats,
            decoded,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
