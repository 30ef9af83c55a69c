//! Recall: two-stage hidden value recall experience for RL fine-tuning
//!
//! Provides subcommands:
//!
//! - `rollout` -- Collect experience over a prompt dataset
//! - `sample`  -- Show the secrets and prompts of one step
//! - `score`   -- Re-score saved trajectories
//! - `config`  -- Print the effective configuration

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use recall::config::RecallConfig;
use recall::experience::ExperienceCollector;
use recall::model::{AnyCodec, AnyEngine, HttpEngine, MockEngine};
use recall::training::{save_trajectories, PromptDataset, RolloutPipeline};
use recall::trajectory::types::Trajectory;
use recall::trajectory::{recalled_value, reward_fn};

/// Environment variable the engine API key is read from.
const API_KEY_VAR: &str = "RECALL_API_KEY";

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// Recall: two-stage hidden value recall experience for RL fine-tuning
#[derive(Parser)]
#[command(name = "recall", version, about)]
struct Cli {
    /// Path to a JSON configuration file (uses defaults if not provided).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the offline mock engine instead of the generation server.
    #[arg(long, global = true, default_value_t = true, action = clap::ArgAction::Set)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect two-stage experience over a prompt dataset.
    Rollout {
        /// Prompt file (.json, .jsonl, or one prompt per line).
        #[arg(long, default_value = "data/prompts.txt")]
        prompts: PathBuf,

        /// Directory for the run summary and trajectories.
        #[arg(long, default_value = "data/rollout")]
        output_dir: PathBuf,
    },

    /// Show the secrets and stage-1 prompts a step would use.
    Sample {
        /// Step to sample for.
        #[arg(long, default_value_t = 0)]
        step: u64,

        /// Base prompt to compose with.
        #[arg(long, default_value = "Roses are red,\nViolets are blue,\n")]
        prompt: String,

        /// Number of batch elements.
        #[arg(long, default_value_t = 4)]
        count: usize,
    },

    /// Re-score a saved trajectory file.
    Score {
        /// Path to a trajectory file written by `rollout`.
        #[arg(default_value = "data/rollout/trajectories.json")]
        path: PathBuf,
    },

    /// Print the effective configuration as JSON.
    Config,
}

// ---------------------------------------------------------------------------
// Entrypoint
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing (reads RUST_LOG env var, defaults to info).
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RecallConfig::load_from_file(path)?,
        None => RecallConfig::default(),
    };
    config.apply_env_api_key(std::env::var(API_KEY_VAR).ok());
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Commands::Rollout {
            prompts,
            output_dir,
        } => cmd_rollout(&config, cli.mock, &prompts, &output_dir).await,
        Commands::Sample {
            step,
            prompt,
            count,
        } => cmd_sample(&config, step, &prompt, count),
        Commands::Score { path } => cmd_score(&path),
        Commands::Config => cmd_config(&config),
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_rollout(
    config: &RecallConfig,
    mock: bool,
    prompts_path: &Path,
    output_dir: &Path,
) -> Result<()> {
    tracing::info!(prompts = %prompts_path.display(), mock, "Starting rollout");

    let dataset = PromptDataset::load_from_file(prompts_path)?;
    let codec = AnyCodec::from_config(config.codec.tokenizer_path.as_deref())?;
    let mut engine = create_engine(config, &codec, mock)?;
    let pipeline = RolloutPipeline::new(config.clone())?;

    let rollout = pipeline.run(&codec, &mut engine, &dataset).await?;

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    rollout.summary.save_to_file(output_dir.join("summary.json"))?;
    save_trajectories(rollout.trajectories(), output_dir.join("trajectories.json"))?;

    tracing::info!(
        run_id = %rollout.summary.run_id,
        steps = rollout.summary.steps.len(),
        mean_reward = format!("{:.2}%", rollout.summary.mean_reward * 100.0),
        "Rollout complete"
    );
    Ok(())
}

fn cmd_sample(config: &RecallConfig, step: u64, prompt: &str, count: usize) -> Result<()> {
    let collector = ExperienceCollector::new(
        config.templates.clone(),
        config.alphabet()?,
        config.experience.seed,
    );
    let prompt = prompt.replace("\\n", "\n");

    println!("Step {step} (seed {})", config.experience.seed);
    println!();
    for (i, secret) in collector.secrets_for_step(step, count).into_iter().enumerate() {
        println!("[{i}] secret = {secret}");
        println!("{}", collector.templates().compose_stage1(secret, &prompt));
        println!();
    }
    println!("Stage-2 prompt (empty continuation):");
    println!("{}", collector.templates().compose_stage2(&prompt, ""));
    Ok(())
}

fn cmd_score(path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let trajectories: Vec<Trajectory> =
        serde_json::from_str(&text).context("Failed to parse trajectories")?;
    let rewards = reward_fn(&trajectories);

    println!("Trajectories: {}", path.display());
    println!("  Total: {}", trajectories.len());
    if trajectories.is_empty() {
        return Ok(());
    }

    let correct = rewards.iter().filter(|r| **r > 0.0).count();
    let unparsed = trajectories
        .iter()
        .filter(|t| recalled_value(t.final_output()).is_none())
        .count();
    let total = trajectories.len() as f64;
    println!("  Recalled: {correct} ({:.1}%)", correct as f64 / total * 100.0);
    println!("  Unparseable: {unparsed} ({:.1}%)", unparsed as f64 / total * 100.0);
    Ok(())
}

fn cmd_config(config: &RecallConfig) -> Result<()> {
    let mut shown = config.clone();
    if !shown.engine.api_key.is_empty() {
        shown.engine.api_key = "<redacted>".into();
    }
    println!("{}", serde_json::to_string_pretty(&shown)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Engine construction
// ---------------------------------------------------------------------------

fn create_engine(config: &RecallConfig, codec: &AnyCodec, mock: bool) -> Result<AnyEngine> {
    if mock {
        tracing::info!("Using mock generation engine");
        Ok(AnyEngine::Mock(MockEngine::new(
            codec.clone(),
            config.alphabet()?,
            config.experience.seed,
        )))
    } else {
        tracing::info!(api_base = %config.engine.api_base, "Using HTTP generation engine");
        Ok(AnyEngine::Http(HttpEngine::new(&config.engine)?))
    }
}
