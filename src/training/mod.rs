//! Rollout driver for the recall experience pipeline.
//!
//! - [`dataset`] -- base prompts loaded from JSON, JSON lines, or text.
//! - [`pipeline`] -- the step loop that collects experience batch by batch and
//!   records per-step metrics.

pub mod dataset;
pub mod pipeline;

pub use dataset::PromptDataset;
pub use pipeline::{save_trajectories, Rollout, RolloutPipeline, RolloutSummary, StepMetrics};
