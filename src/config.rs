use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::experience::sampler::SecretAlphabet;
use crate::model::prompt::PromptTemplates;

/// Complete configuration for a recall rollout run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecallConfig {
    pub experience: ExperienceConfig,
    pub templates: PromptTemplates,
    pub engine: EngineConfig,
    pub codec: CodecConfig,
}

/// Batching, secrets, and seeding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperienceConfig {
    /// Prompts per step (default: 16).
    pub batch_size: usize,
    /// Smallest secret value, inclusive (default: 0).
    pub secret_low: u32,
    /// Largest secret value, inclusive (default: 1).
    pub secret_high: u32,
    /// Base seed for secret sampling (default: 42).
    pub seed: u64,
    /// Stop after this many steps; `None` runs through the dataset once.
    pub max_steps: Option<usize>,
}

/// Generation server connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL of the generation server.
    pub api_base: String,
    /// Bearer token; filled from `RECALL_API_KEY` when empty.
    pub api_key: String,
    /// Policy model identifier (e.g. "gpt2").
    pub model_id: String,
    /// Maximum sampled tokens per element (default: 32).
    pub max_new_tokens: usize,
    /// Sampling temperature (default: 1.0).
    pub temperature: f64,
    /// Per-request timeout; none by default.
    pub request_timeout_secs: Option<u64>,
}

/// Text codec selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// HuggingFace `tokenizer.json`; the byte codec is used when unset.
    pub tokenizer_path: Option<PathBuf>,
}

impl Default for ExperienceConfig {
    fn default() -> Self {
        Self {
            batch_size: 16,
            secret_low: 0,
            secret_high: 1,
            seed: 42,
            max_steps: None,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8000/v1".into(),
            api_key: String::new(),
            model_id: "gpt2".into(),
            max_new_tokens: 32,
            temperature: 1.0,
            request_timeout_secs: None,
        }
    }
}

impl RecallConfig {
    /// Read a JSON config; missing fields take their defaults.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Fill the API key from the environment when the file left it empty.
    pub fn apply_env_api_key(&mut self, key: Option<String>) {
        if let Some(key) = key {
            if self.engine.api_key.is_empty() {
                self.engine.api_key = key;
            }
        }
    }

    /// The secret range as a validated alphabet.
    pub fn alphabet(&self) -> PipelineResult<SecretAlphabet> {
        SecretAlphabet::new(self.experience.secret_low, self.experience.secret_high)
    }

    /// Check everything that would otherwise fail mid-run.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.experience.batch_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "experience.batch_size must be at least 1".into(),
            ));
        }
        self.alphabet()?;
        self.templates.validate()?;
        if self.engine.max_new_tokens == 0 {
            return Err(PipelineError::InvalidConfig(
                "engine.max_new_tokens must be at least 1".into(),
            ));
        }
        if !(self.engine.temperature.is_finite() && self.engine.temperature >= 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "engine.temperature must be finite and non-negative, got {}",
                self.engine.temperature
            )));
        }
        Ok(())
    }
}
