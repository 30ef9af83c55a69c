//! Core per-element records of one experience step.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The hidden value an agent must encode in stage 1 and recall in stage 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(pub u32);

impl Secret {
    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Secret {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Scalar correctness signal for one trajectory: 1.0 for an exact recall,
/// 0.0 otherwise.
pub type Reward = f64;

/// One batch element's full two-stage interaction.
///
/// The five fields always appear in this order: the secret, then the decoded
/// prompt and output of stage 1, then those of stage 2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trajectory {
    pub secret: Secret,
    pub stage1_prompt: String,
    pub stage1_output: String,
    pub stage2_prompt: String,
    pub stage2_output: String,
}

impl Trajectory {
    /// The text the reward is read from.
    pub fn final_output(&self) -> &str {
        &self.stage2_output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_display_and_serde() {
        let s = Secret(7);
        assert_eq!(s.to_string(), "7");
        assert_eq!(serde_json::to_string(&s).unwrap(), "7");
        assert_eq!(serde_json::from_str::<Secret>("3").unwrap(), Secret(3));
    }

    #[test]
    fn test_trajectory_field_order() {
        let t = Trajectory {
            secret: Secret(1),
            stage1_prompt: "p1".into(),
            stage1_output: "o1".into(),
            stage2_prompt: "p2".into(),
            stage2_output: "o2".into(),
        };
        let json = serde_json::to_string(&t).unwrap();
        let positions: Vec<usize> = [
            "\"secret\"",
            "\"stage1_prompt\"",
            "\"stage1_output\"",
            "\"stage2_prompt\"",
            "\"stage2_output\"",
        ]
        .iter()
        .map(|k| json.find(k).unwrap())
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(t.final_output(), "o2");
    }
}
