//! Secret sampling.
//!
//! Secrets are drawn from an explicitly seeded [`StdRng`]; nothing touches a
//! process-wide generator. [`SecretSampler::for_step`] derives a generator
//! from `(seed, step)` alone, so a step's secrets do not depend on how many
//! earlier steps ran, failed, or are running concurrently.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{PipelineError, PipelineResult};
use crate::trajectory::types::Secret;

/// Inclusive range `[low, high]` that secrets are drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecretAlphabet {
    low: u32,
    high: u32,
}

impl SecretAlphabet {
    pub fn new(low: u32, high: u32) -> PipelineResult<Self> {
        if low > high {
            return Err(PipelineError::InvalidConfig(format!(
                "secret alphabet is empty: low {low} > high {high}"
            )));
        }
        Ok(Self { low, high })
    }

    pub fn low(&self) -> u32 {
        self.low
    }

    pub fn high(&self) -> u32 {
        self.high
    }

    /// Number of distinct secrets.
    pub fn size(&self) -> u64 {
        u64::from(self.high - self.low) + 1
    }

    pub fn contains(&self, secret: Secret) -> bool {
        (self.low..=self.high).contains(&secret.value())
    }

    /// Draw `n` independent uniform secrets from `rng`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, n: usize) -> Vec<Secret> {
        (0..n)
            .map(|_| Secret(rng.gen_range(self.low..=self.high)))
            .collect()
    }
}

impl Default for SecretAlphabet {
    /// The binary alphabet `{0, 1}`.
    fn default() -> Self {
        Self { low: 0, high: 1 }
    }
}

/// Mix a base seed with a step index into a step-local seed (SplitMix64).
pub fn step_seed(seed: u64, step: u64) -> u64 {
    let mut z = seed.wrapping_add(step.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Seeded source of secrets.
#[derive(Debug, Clone)]
pub struct SecretSampler {
    alphabet: SecretAlphabet,
    rng: StdRng,
}

impl SecretSampler {
    pub fn new(alphabet: SecretAlphabet, seed: u64) -> Self {
        Self {
            alphabet,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Sampler for one training step, independent of every other step.
    pub fn for_step(alphabet: SecretAlphabet, seed: u64, step: u64) -> Self {
        Self::new(alphabet, step_seed(seed, step))
    }

    pub fn alphabet(&self) -> SecretAlphabet {
        self.alphabet
    }

    /// Draw one secret per batch element.
    pub fn sample(&mut self, n: usize) -> Vec<Secret> {
        self.alphabet.sample(&mut self.rng, n)
    }
}
