//! Model-side collaborators of the experience pipeline.
//!
//! This module provides:
//! - [`codec`] -- text <-> token conversion ([`ByteCodec`], [`TokenizerCodec`]).
//! - [`engine`] -- the [`GenerationEngine`] interface and its result type.
//! - [`api::HttpEngine`] -- engine backed by a remote generation server.
//! - [`mock`] -- offline engines for tests and dry runs.
//! - [`prompt`] -- the stage-1 and stage-2 prompt templates.

pub mod api;
pub mod codec;
pub mod engine;
pub mod mock;
pub mod prompt;

pub use api::HttpEngine;
pub use codec::{AnyCodec, ByteCodec, DecodedBatch, TextCodec, TokenBatch, TokenId, TokenizerCodec};
pub use engine::{GenerationEngine, GenerationResult, StatsMap};
pub use mock::{MockEngine, ScriptedEngine};
pub use prompt::PromptTemplates;

// ---------------------------------------------------------------------------
// AnyEngine: enum dispatch wrapper for runtime engine selection
// ---------------------------------------------------------------------------

/// All engines the binary can select at runtime. Async trait methods rule out
/// `dyn GenerationEngine`, so selection goes through this enum instead.
pub enum AnyEngine {
    Http(HttpEngine),
    Mock(MockEngine<AnyCodec>),
}

impl GenerationEngine for AnyEngine {
    async fn generate_and_score(
        &mut self,
        batch: &TokenBatch,
    ) -> anyhow::Result<(GenerationResult, StatsMap)> {
        match self {
            Self::Http(e) => e.generate_and_score(batch).await,
            Self::Mock(e) => e.generate_and_score(batch).await,
        }
    }
}
