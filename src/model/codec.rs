//! Text codec: string batches to token batches and back.
//!
//! The experience collector never looks inside a token; it only relies on
//! `decode(encode(prompt), encode(output))` giving back equivalent text. Two
//! codecs are provided:
//!
//! - [`ByteCodec`] treats every UTF-8 byte as a token. Lossless, dependency
//!   free, and what the tests and the mock engine use.
//! - [`TokenizerCodec`] wraps a HuggingFace `tokenizer.json`. BPE tokenizers
//!   may normalise whitespace at token boundaries; that is accepted as-is.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// An opaque token identifier.
pub type TokenId = u32;

/// An ordered batch of token sequences, one per batch element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBatch {
    pub sequences: Vec<Vec<TokenId>>,
}

impl TokenBatch {
    pub fn new(sequences: Vec<Vec<TokenId>>) -> Self {
        Self { sequences }
    }

    /// Number of batch elements.
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Total number of tokens across all elements.
    pub fn total_tokens(&self) -> usize {
        self.sequences.iter().map(Vec::len).sum()
    }
}

/// The strings recovered from a query/response token batch pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedBatch {
    /// Full decoded text per element (query followed by response).
    pub samples: Vec<String>,
    /// Decoded query (prompt) per element.
    pub prompts: Vec<String>,
    /// Decoded response (model output) per element.
    pub outputs: Vec<String>,
}

impl DecodedBatch {
    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }
}

/// Conversion between string batches and token batches.
pub trait TextCodec: Send + Sync {
    /// Tokenize each string independently, preserving order.
    fn encode(&self, texts: &[String]) -> Result<TokenBatch>;

    /// Detokenize index-aligned query and response batches.
    fn decode(&self, queries: &TokenBatch, responses: &TokenBatch) -> Result<DecodedBatch>;
}

/// Shared decode loop: both codecs only differ in how one sequence is turned
/// back into text.
fn decode_pairs<F>(
    queries: &TokenBatch,
    responses: &TokenBatch,
    mut detok: F,
) -> Result<DecodedBatch>
where
    F: FnMut(&[TokenId]) -> Result<String>,
{
    if queries.len() != responses.len() {
        bail!(
            "cannot decode {} queries against {} responses",
            queries.len(),
            responses.len()
        );
    }

    let mut decoded = DecodedBatch {
        samples: Vec::with_capacity(queries.len()),
        prompts: Vec::with_capacity(queries.len()),
        outputs: Vec::with_capacity(queries.len()),
    };

    for (i, (query, response)) in queries
        .sequences
        .iter()
        .zip(&responses.sequences)
        .enumerate()
    {
        let prompt = detok(query).with_context(|| format!("failed to decode query {i}"))?;
        let output = detok(response).with_context(|| format!("failed to decode response {i}"))?;
        decoded.samples.push(format!("{prompt}{output}"));
        decoded.prompts.push(prompt);
        decoded.outputs.push(output);
    }

    Ok(decoded)
}

// ---------------------------------------------------------------------------
// Byte codec
// ---------------------------------------------------------------------------

/// Byte-level codec: token `t` is the byte `t`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteCodec;

impl ByteCodec {
    fn detokenize(tokens: &[TokenId]) -> Result<String> {
        let bytes = tokens
            .iter()
            .map(|&t| u8::try_from(t).map_err(|_| anyhow!("token {t} is not a byte")))
            .collect::<Result<Vec<u8>>>()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl TextCodec for ByteCodec {
    fn encode(&self, texts: &[String]) -> Result<TokenBatch> {
        Ok(TokenBatch::new(
            texts
                .iter()
                .map(|t| t.bytes().map(TokenId::from).collect())
                .collect(),
        ))
    }

    fn decode(&self, queries: &TokenBatch, responses: &TokenBatch) -> Result<DecodedBatch> {
        decode_pairs(queries, responses, Self::detokenize)
    }
}

// ---------------------------------------------------------------------------
// HuggingFace tokenizer codec
// ---------------------------------------------------------------------------

/// Codec backed by a HuggingFace `tokenizers` model.
#[derive(Clone)]
pub struct TokenizerCodec {
    inner: Arc<tokenizers::Tokenizer>,
}

impl std::fmt::Debug for TokenizerCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenizerCodec")
            .field("vocab_size", &self.vocab_size())
            .finish()
    }
}

impl TokenizerCodec {
    /// Load from a local `tokenizer.json`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let inner = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| anyhow!("failed to load tokenizer from {}: {e}", path.display()))?;
        info!(
            path = %path.display(),
            vocab_size = inner.get_vocab_size(true),
            "Loaded tokenizer"
        );
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Load from the raw bytes of a `tokenizer.json`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let inner = tokenizers::Tokenizer::from_bytes(bytes)
            .map_err(|e| anyhow!("failed to load tokenizer from bytes: {e}"))?;
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }
}

impl TextCodec for TokenizerCodec {
    fn encode(&self, texts: &[String]) -> Result<TokenBatch> {
        let mut sequences = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            let encoding = self
                .inner
                .encode(text.as_str(), false)
                .map_err(|e| anyhow!("failed to encode element {i}: {e}"))?;
            sequences.push(encoding.get_ids().to_vec());
        }
        Ok(TokenBatch::new(sequences))
    }

    fn decode(&self, queries: &TokenBatch, responses: &TokenBatch) -> Result<DecodedBatch> {
        decode_pairs(queries, responses, |ids| {
            self.inner
                .decode(ids, true)
                .map_err(|e| anyhow!("decoding error: {e}"))
        })
    }
}

// ---------------------------------------------------------------------------
// Runtime selection
// ---------------------------------------------------------------------------

/// Codec chosen at runtime from configuration.
#[derive(Debug, Clone)]
pub enum AnyCodec {
    Byte(ByteCodec),
    Tokenizer(TokenizerCodec),
}

impl AnyCodec {
    /// Use the tokenizer at `path` when given, the byte codec otherwise.
    pub fn from_config(tokenizer_path: Option<&Path>) -> Result<Self> {
        match tokenizer_path {
            Some(path) => Ok(Self::Tokenizer(TokenizerCodec::from_file(path)?)),
            None => Ok(Self::Byte(ByteCodec)),
        }
    }
}

impl TextCodec for AnyCodec {
    fn encode(&self, texts: &[String]) -> Result<TokenBatch> {
        match self {
            Self::Byte(c) => c.encode(texts),
            Self::Tokenizer(c) => c.encode(texts),
        }
    }

    fn decode(&self, queries: &TokenBatch, responses: &TokenBatch) -> Result<DecodedBatch> {
        match self {
            Self::Byte(c) => c.decode(queries, responses),
            Self::Tokenizer(c) => c.decode(queries, responses),
        }
    }
}
