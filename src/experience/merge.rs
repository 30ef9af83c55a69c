//! Combining the two stages of a step into one record for the optimizer.
//!
//! Generation results are concatenated field by field along the batch axis
//! (stage 1 first), so a step over `n` prompts hands `2n` rows to the
//! optimizer. Stats maps are summed key by key and must agree on their keys.

use std::collections::BTreeSet;

use crate::error::{PipelineError, PipelineResult};
use crate::model::engine::{GenerationResult, StatsMap};

const CONTEXT: &str = "batch merge";

/// Concatenate two stage results of equal batch size `n` into one of size `2n`.
pub fn merge_results(
    first: GenerationResult,
    second: GenerationResult,
) -> PipelineResult<GenerationResult> {
    let n = first.len();
    first.check_shape(CONTEXT, n)?;
    second.check_shape(CONTEXT, n)?;

    let GenerationResult {
        mut query_tensors,
        mut response_tensors,
        mut samples,
        mut logprobs,
        mut ref_logprobs,
        mut values,
    } = first;

    query_tensors.extend(second.query_tensors);
    response_tensors.extend(second.response_tensors);
    samples.extend(second.samples);
    logprobs.extend(second.logprobs);
    ref_logprobs.extend(second.ref_logprobs);
    values.extend(second.values);

    Ok(GenerationResult {
        query_tensors,
        response_tensors,
        samples,
        logprobs,
        ref_logprobs,
        values,
    })
}

/// Sum two stats maps key by key.
///
/// Both maps must report exactly the same keys; summing over a partial key set
/// would silently drop a statistic.
pub fn merge_stats(first: &StatsMap, second: &StatsMap) -> PipelineResult<StatsMap> {
    let first_keys: BTreeSet<&String> = first.keys().collect();
    let second_keys: BTreeSet<&String> = second.keys().collect();

    if first_keys != second_keys {
        return Err(PipelineError::KeySetMismatch {
            only_in_first: first_keys
                .difference(&second_keys)
                .map(|k| k.to_string())
                .collect(),
            only_in_second: second_keys
                .difference(&first_keys)
                .map(|k| k.to_string())
                .collect(),
        });
    }

    Ok(first
        .iter()
        .map(|(key, value)| (key.clone(), value + second[key]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(n: usize, marker: u32) -> GenerationResult {
        GenerationResult {
            query_tensors: (0..n).map(|i| vec![marker, i as u32]).collect(),
            response_tensors: vec![vec![marker]; n],
            samples: vec![vec![marker, marker]; n],
            logprobs: vec![vec![-(marker as f64)]; n],
            ref_logprobs: vec![vec![-1.0]; n],
            values: vec![vec![0.5]; n],
        }
    }

    fn stats(pairs: &[(&str, f64)]) -> StatsMap {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_merge_results_doubles_every_field() {
        for n in [1, 2, 5] {
            let merged = merge_results(stage(n, 1), stage(n, 2)).unwrap();
            for (field, len) in merged.field_lengths() {
                assert_eq!(len, 2 * n, "field {field}");
            }
        }
    }

    #[test]
    fn test_merge_results_stage_one_first() {
        let merged = merge_results(stage(2, 1), stage(2, 2)).unwrap();
        assert_eq!(
            merged.query_tensors,
            vec![vec![1, 0], vec![1, 1], vec![2, 0], vec![2, 1]]
        );
        assert_eq!(merged.logprobs[1], vec![-1.0]);
        assert_eq!(merged.logprobs[2], vec![-2.0]);
    }

    #[test]
    fn test_merge_results_rejects_size_difference() {
        let err = merge_results(stage(2, 1), stage(3, 2)).unwrap_err();
        assert!(matches!(err, PipelineError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_merge_results_rejects_ragged_input() {
        let mut ragged = stage(2, 1);
        ragged.values.push(vec![0.0]);
        let err = merge_results(ragged, stage(2, 2)).unwrap_err();
        match err {
            PipelineError::ShapeMismatch { field, .. } => assert_eq!(field, "values"),
            other => panic!("expected shape mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_merge_stats_sums_values() {
        let a = stats(&[("kl", 0.1), ("reward_proxy", 2.0)]);
        let b = stats(&[("kl", 0.3), ("reward_proxy", -1.0)]);
        let merged = merge_stats(&a, &b).unwrap();
        assert_eq!(merged.len(), 2);
        assert!((merged["kl"] - 0.4).abs() < 1e-12);
        assert!((merged["reward_proxy"] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_merge_stats_commutative() {
        let a = stats(&[("a", 1.5), ("b", -2.25), ("c", 1e6)]);
        let b = stats(&[("a", 0.5), ("b", 4.0), ("c", 3.0)]);
        assert_eq!(merge_stats(&a, &b).unwrap(), merge_stats(&b, &a).unwrap());
    }

    #[test]
    fn test_merge_stats_empty() {
        assert!(merge_stats(&StatsMap::new(), &StatsMap::new())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_merge_stats_key_mismatch() {
        let a = stats(&[("kl", 0.1), ("only_a", 1.0)]);
        let b = stats(&[("kl", 0.3), ("only_b", 1.0)]);
        match merge_stats(&a, &b) {
            Err(PipelineError::KeySetMismatch {
                only_in_first,
                only_in_second,
            }) => {
                assert_eq!(only_in_first, vec!["only_a".to_string()]);
                assert_eq!(only_in_second, vec!["only_b".to_string()]);
            }
            other => panic!("expected key set mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_merge_stats_missing_key_one_side() {
        let a = stats(&[("kl", 0.1)]);
        let b = stats(&[("kl", 0.3), ("extra", 1.0)]);
        assert!(matches!(
            merge_stats(&a, &b),
            Err(PipelineError::KeySetMismatch { .. })
        ));
    }
}
