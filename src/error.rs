//! Error taxonomy for a single experience-collection step.
//!
//! Every variant is fatal to the step that raised it. There is no parse
//! error: an unparseable answer is scored as wrong.

use thiserror::Error;

/// Errors raised while building, merging, or scoring one step's experience.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PipelineError {
    /// Per-element sequences that must be index-aligned have different lengths.
    #[error("shape mismatch in {context}: `{field}` has {found} elements, expected {expected}")]
    ShapeMismatch {
        context: &'static str,
        field: &'static str,
        expected: usize,
        found: usize,
    },

    /// Two stats maps that should be summed report different keys.
    #[error(
        "stats key sets differ: only in first {only_in_first:?}, only in second {only_in_second:?}"
    )]
    KeySetMismatch {
        only_in_first: Vec<String>,
        only_in_second: Vec<String>,
    },

    /// The text codec or generation engine failed; passed through untouched.
    #[error(transparent)]
    CollaboratorFailure(#[from] anyhow::Error),

    /// Configuration rejected before any step ran.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result alias for pipeline operations.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Whether the error signals a broken data contract (as opposed to a
    /// collaborator or configuration failure).
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            PipelineError::ShapeMismatch { .. } | PipelineError::KeySetMismatch { .. }
        )
    }

    /// Shorthand for a length check failure.
    pub(crate) fn shape(
        context: &'static str,
        field: &'static str,
        expected: usize,
        found: usize,
    ) -> Self {
        PipelineError::ShapeMismatch {
            context,
            field,
            expected,
            found,
        }
    }
}

/// Fail with [`PipelineError::ShapeMismatch`] unless `found == expected`.
pub(crate) fn ensure_len(
    context: &'static str,
    field: &'static str,
    expected: usize,
    found: usize,
) -> PipelineResult<()> {
    if found == expected {
        Ok(())
    } else {
        Err(PipelineError::shape(context, field, expected, found))
    }
}
