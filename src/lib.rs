//! Recall: two-stage hidden value recall experience for RL fine-tuning.
//!
//! Each step shows the policy a secret, lets it continue a poem, then asks it
//! to recall the secret from the poem and its own continuation alone. Both
//! stages' generations are merged into one batch for the optimizer and every
//! trajectory is scored by exact recall.

pub mod config;
pub mod error;
pub mod experience;
pub mod model;
pub mod training;
pub mod trajectory;

pub use error::{PipelineError, PipelineResult};
