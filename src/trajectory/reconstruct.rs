//! Zip the per-element sequences of a finished step into trajectories.

use crate::error::{ensure_len, PipelineResult};

use super::types::{Secret, Trajectory};

const CONTEXT: &str = "trajectory reconstruction";

/// Build one [`Trajectory`] per batch element.
///
/// All five sequences must have the same length as `secrets`. A mismatch is a
/// broken contract upstream and fails the step; nothing is truncated or padded.
pub fn reconstruct_trajectories(
    secrets: &[Secret],
    stage1_prompts: &[String],
    stage1_outputs: &[String],
    stage2_prompts: &[String],
    stage2_outputs: &[String],
) -> PipelineResult<Vec<Trajectory>> {
    let n = secrets.len();
    ensure_len(CONTEXT, "stage1_prompts", n, stage1_prompts.len())?;
    ensure_len(CONTEXT, "stage1_outputs", n, stage1_outputs.len())?;
    ensure_len(CONTEXT, "stage2_prompts", n, stage2_prompts.len())?;
    ensure_len(CONTEXT, "stage2_outputs", n, stage2_outputs.len())?;

    Ok((0..n)
        .map(|i| Trajectory {
            secret: secrets[i],
            stage1_prompt: stage1_prompts[i].clone(),
            stage1_output: stage1_outputs[i].clone(),
            stage2_prompt: stage2_prompts[i].clone(),
            stage2_output: stage2_outputs[i].clone(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    fn texts(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{prefix}{i}")).collect()
    }

    #[test]
    fn test_reconstruct_aligns_by_index() {
        let secrets = vec![Secret(0), Secret(1), Secret(1)];
        let trajectories = reconstruct_trajectories(
            &secrets,
            &texts("p1-", 3),
            &texts("o1-", 3),
            &texts("p2-", 3),
            &texts("o2-", 3),
        )
        .unwrap();

        assert_eq!(trajectories.len(), 3);
        for (i, t) in trajectories.iter().enumerate() {
            assert_eq!(t.secret, secrets[i]);
            assert_eq!(t.stage1_prompt, format!("p1-{i}"));
            assert_eq!(t.stage1_output, format!("o1-{i}"));
            assert_eq!(t.stage2_prompt, format!("p2-{i}"));
            assert_eq!(t.stage2_output, format!("o2-{i}"));
        }
    }

    #[test]
    fn test_reconstruct_empty_batch() {
        let trajectories = reconstruct_trajectories(&[], &[], &[], &[], &[]).unwrap();
        assert!(trajectories.is_empty());
    }

    #[test]
    fn test_reconstruct_rejects_short_sequence() {
        let err = reconstruct_trajectories(
            &[Secret(0), Secret(1)],
            &texts("p1-", 2),
            &texts("o1-", 2),
            &texts("p2-", 2),
            &texts("o2-", 1),
        )
        .unwrap_err();

        match err {
            PipelineError::ShapeMismatch {
                field,
                expected,
                found,
                ..
            } => {
                assert_eq!(field, "stage2_outputs");
                assert_eq!((expected, found), (2, 1));
            }
            other => panic!("expected shape mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_reconstruct_rejects_long_sequence() {
        let result = reconstruct_trajectories(
            &[Secret(0)],
            &texts("p1-", 2),
            &texts("o1-", 1),
            &texts("p2-", 1),
            &texts("o2-", 1),
        );
        assert!(matches!(result, Err(PipelineError::ShapeMismatch { .. })));
    }
}
