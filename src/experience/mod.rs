//! Building one step of two-stage experience.
//!
//! - [`sampler`] -- seeded secret sampling, one independent stream per step.
//! - [`merge`] -- concatenation of both stages' results and summing of stats.
//! - [`collector`] -- the step itself: compose, generate, decode, reconstruct,
//!   merge, and score.

pub mod collector;
pub mod merge;
pub mod sampler;

pub use collector::{Experience, ExperienceCollector};
pub use merge::{merge_results, merge_stats};
pub use sampler::{step_seed, SecretAlphabet, SecretSampler};
