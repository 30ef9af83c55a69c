//! Trajectory records and the functions that build and score them.
//!
//! - [`types::Trajectory`] -- the five-field record of one element's two-stage
//!   interaction, plus [`types::Secret`] and [`types::Reward`].
//! - [`reconstruct::reconstruct_trajectories`] -- zips a step's per-element
//!   sequences into trajectories.
//! - [`reward::reward_fn`] -- exact-match recall reward.

pub mod reconstruct;
pub mod reward;
pub mod types;

pub use reconstruct::reconstruct_trajectories;
pub use reward::{recalled_value, reward_fn, score_trajectory};
pub use types::{Reward, Secret, Trajectory};
