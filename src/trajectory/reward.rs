//! Exact-match reward for the recall game.
//!
//! The recalled value is read from the last whitespace-delimited token of the
//! stage-2 output. That token must consist solely of ASCII digits; anything
//! else, including trailing punctuation (`"1!"`) or a sign (`"+1"`), counts as
//! unparseable and earns no reward. Scoring never fails.

use super::types::{Reward, Trajectory};

/// The value recalled in `text`, or `None` when the last token is not a
/// non-negative integer literal.
pub fn recalled_value(text: &str) -> Option<u64> {
    let last = text.split_whitespace().next_back()?;
    if !last.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    last.parse().ok()
}

/// 1.0 when the trajectory's final output recalls its secret, else 0.0.
pub fn score_trajectory(trajectory: &Trajectory) -> Reward {
    match recalled_value(trajectory.final_output()) {
        Some(value) if value == u64::from(trajectory.secret.value()) => 1.0,
        _ => 0.0,
    }
}

/// Score every trajectory, preserving order.
pub fn reward_fn(trajectories: &[Trajectory]) -> Vec<Reward> {
    trajectories.iter().map(score_trajectory).collect()
}
