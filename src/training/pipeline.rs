//! Rollout loop over a prompt dataset.
//!
//! ```text
//! for step, batch in dataset.batches(batch_size):      (up to max_steps)
//!     experience = collector.collect(codec, engine, step, batch)
//!     record StepMetrics
//! ```
//!
//! Handing each step's merged data and rewards to a policy optimizer is left
//! to the caller: [`RolloutPipeline::run`] returns the experiences with the
//! summary, and nothing is trained here.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::RecallConfig;
use crate::error::PipelineResult;
use crate::experience::collector::{Experience, ExperienceCollector};
use crate::model::codec::TextCodec;
use crate::model::engine::{GenerationEngine, StatsMap};
use crate::trajectory::recalled_value;
use crate::trajectory::types::Trajectory;

use super::dataset::PromptDataset;

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Metrics recorded for every collected step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepMetrics {
    /// Global step (0-indexed).
    pub step: u64,
    /// Number of prompts in the step.
    pub batch_size: usize,
    /// Fraction of exact recalls.
    pub mean_reward: f64,
    /// Fraction of stage-2 outputs whose last token is not a number.
    pub parse_failure_rate: f64,
    /// Mean length of the stage-1 continuations, in characters.
    pub mean_stage1_output_chars: f64,
    /// Rows handed to the optimizer (twice the batch size).
    pub merged_batch_size: usize,
    /// Merged engine stats of the step.
    pub stats: StatsMap,
}

impl StepMetrics {
    pub fn from_experience(step: u64, experience: &Experience) -> Self {
        let n = experience.len();
        let mean = |total: f64| if n == 0 { 0.0 } else { total / n as f64 };

        let parse_failures = experience
            .trajectories
            .iter()
            .filter(|t| recalled_value(t.final_output()).is_none())
            .count();
        let stage1_chars: usize = experience
            .trajectories
            .iter()
            .map(|t| t.stage1_output.chars().count())
            .sum();

        Self {
            step,
            batch_size: n,
            mean_reward: experience.mean_reward(),
            parse_failure_rate: mean(parse_failures as f64),
            mean_stage1_output_chars: mean(stage1_chars as f64),
            merged_batch_size: experience.data.len(),
            stats: experience.stats.clone(),
        }
    }
}

/// Summary of one rollout run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<StepMetrics>,
    /// Mean reward over every trajectory of the run.
    pub mean_reward: f64,
}

impl RolloutSummary {
    /// Write the summary as pretty-printed JSON.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize rollout summary to JSON")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write rollout summary to {}", path.display()))?;
        info!(path = %path.display(), steps = self.steps.len(), "Saved rollout summary");
        Ok(())
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read rollout summary from {}", path.display()))?;
        serde_json::from_str(&data).context("Failed to deserialize rollout summary JSON")
    }
}

/// Result of [`RolloutPipeline::run`].
#[derive(Debug, Clone)]
pub struct Rollout {
    pub summary: RolloutSummary,
    pub experiences: Vec<Experience>,
}

impl Rollout {
    /// All trajectories of the run, in step order.
    pub fn trajectories(&self) -> impl Iterator<Item = &Trajectory> {
        self.experiences.iter().flat_map(|e| e.trajectories.iter())
    }
}

/// Write trajectories as a pretty-printed JSON array.
pub fn save_trajectories<'a>(
    trajectories: impl IntoIterator<Item = &'a Trajectory>,
    path: impl AsRef<Path>,
) -> Result<()> {
    let path = path.as_ref();
    let all: Vec<&Trajectory> = trajectories.into_iter().collect();
    let json = serde_json::to_string_pretty(&all).context("Failed to serialize trajectories")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write trajectories to {}", path.display()))?;
    info!(path = %path.display(), count = all.len(), "Saved trajectories");
    Ok(())
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Drives the experience collector over a dataset.
pub struct RolloutPipeline {
    config: RecallConfig,
    collector: ExperienceCollector,
}

impl RolloutPipeline {
    /// Validate `config` and build the collector it describes.
    pub fn new(config: RecallConfig) -> PipelineResult<Self> {
        config.validate()?;
        let collector = ExperienceCollector::new(
            config.templates.clone(),
            config.alphabet()?,
            config.experience.seed,
        );
        Ok(Self { config, collector })
    }

    pub fn config(&self) -> &RecallConfig {
        &self.config
    }

    pub fn collector(&self) -> &ExperienceCollector {
        &self.collector
    }

    /// Collect one step per dataset batch, stopping at `max_steps`.
    ///
    /// The first failing step aborts the run with its error.
    pub async fn run<C, E>(
        &self,
        codec: &C,
        engine: &mut E,
        dataset: &PromptDataset,
    ) -> PipelineResult<Rollout>
    where
        C: TextCodec,
        E: GenerationEngine,
    {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let batch_size = self.config.experience.batch_size;
        let max_steps = self.config.experience.max_steps.unwrap_or(usize::MAX);

        info!(
            %run_id,
            prompts = dataset.len(),
            batch_size,
            max_steps = ?self.config.experience.max_steps,
            "Starting rollout"
        );
        if dataset.is_empty() {
            warn!(%run_id, "Dataset is empty, nothing to roll out");
        }

        let mut steps = Vec::new();
        let mut experiences = Vec::new();
        let mut reward_total = 0.0;
        let mut trajectory_total = 0usize;

        for (step, batch) in dataset.batches(batch_size).take(max_steps).enumerate() {
            let step = step as u64;
            let experience = self.collector.collect(codec, engine, step, batch).await?;
            let metrics = StepMetrics::from_experience(step, &experience);

            info!(
                step,
                mean_reward = format!("{:.3}", metrics.mean_reward),
                parse_failure_rate = format!("{:.3}", metrics.parse_failure_rate),
                merged_batch_size = metrics.merged_batch_size,
                "Step complete"
            );

            reward_total += experience.rewards.iter().sum::<f64>();
            trajectory_total += experience.len();
            steps.push(metrics);
            experiences.push(experience);
        }

        let mean_reward = if trajectory_total == 0 {
            0.0
        } else {
            reward_total / trajectory_total as f64
        };

        info!(%run_id, steps = steps.len(), mean_reward, "Rollout finished");

        Ok(Rollout {
            summary: RolloutSummary {
                run_id,
                started_at,
                finished_at: Utc::now(),
                steps,
                mean_reward,
            },
            experiences,
        })
    }
}
