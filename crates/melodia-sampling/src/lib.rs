//! # melodia-sampling
//!
//! Categorical sampling from model logits: softmax over the vocabulary
//! dimension, then one multinomial draw. Randomized per call by design:
//! repeated calls with identical logits are not expected to agree; this is
//! the source of generative diversity. Fixing the seed makes a whole
//! generation run reproducible.

/// Sampling error type.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SamplingError {
    /// Logits were empty or contained non-finite values. Non-finite logits
    /// mean upstream corruption (e.g. a bad checkpoint); failing here beats
    /// silently propagating NaN-driven sampling bias.
    #[error("invalid logits")]
    InvalidLogits,

    #[error("temperature must be > 0")]
    InvalidTemperature,

    #[error("no valid tokens to sample")]
    NoValidTokens,
}

pub type SamplingResult<T> = std::result::Result<T, SamplingError>;

/// Deterministic RNG for reproducible sampling.
///
/// Uses a simple xorshift64 algorithm for fast, reproducible random numbers.
#[derive(Debug, Clone)]
pub struct SeededRng {
    state: u64,
}

impl SeededRng {
    pub fn new(seed: u64) -> Self {
        // Avoid zero state which would produce all zeros
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    /// Generate next random float in [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        // xorshift64
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        (self.state >> 40) as f32 / (1u64 << 24) as f32
    }
}

/// Categorical sampler over logits.
///
/// The RNG is explicit and seedable; the serving layer picks the seed
/// (fresh entropy per request, or a caller-supplied value for reproducible
/// output).
#[derive(Debug, Clone)]
pub struct Sampler {
    /// Softmax temperature. > 1.0 = more random, < 1.0 = more deterministic.
    pub temperature: f32,

    /// RNG state. Mutated on each call.
    rng: SeededRng,
}

impl Sampler {
    pub fn new() -> Self {
        Self {
            temperature: 1.0,
            rng: SeededRng::new(42),
        }
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = temp;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = SeededRng::new(seed);
        self
    }

    /// Draw one index from the categorical distribution softmax(logits).
    ///
    /// The logits length is the vocabulary size by the model's contract and
    /// is not re-validated here beyond non-emptiness.
    pub fn sample(&mut self, logits: &[f32]) -> SamplingResult<usize> {
        if logits.is_empty() || logits.iter().any(|v| !v.is_finite()) {
            return Err(SamplingError::InvalidLogits);
        }

        // NaN and infinity are as invalid as zero: a NaN temperature would
        // turn every scaled logit non-finite after the guard above ran.
        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            return Err(SamplingError::InvalidTemperature);
        }

        let probs = if (self.temperature - 1.0).abs() > 1e-6 {
            let scaled: Vec<f32> = logits.iter().map(|l| l / self.temperature).collect();
            Self::softmax(&scaled)
        } else {
            Self::softmax(logits)
        };

        self.draw(&probs)
    }

    fn softmax(logits: &[f32]) -> Vec<f32> {
        let max_logit = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = logits.iter().map(|&l| (l - max_logit).exp()).collect();
        let sum: f32 = exps.iter().sum();

        if sum > 0.0 {
            exps.iter().map(|&e| e / sum).collect()
        } else {
            vec![1.0 / logits.len() as f32; logits.len()]
        }
    }

    /// One multinomial draw from a probability vector.
    fn draw(&mut self, probs: &[f32]) -> SamplingResult<usize> {
        let r = self.rng.next_f32();
        let mut cumsum = 0.0;

        for (i, &prob) in probs.iter().enumerate() {
            cumsum += prob;
            if r < cumsum {
                return Ok(i);
            }
        }

        // Floating-point shortfall: fall back to the last index with
        // nonzero probability.
        for (i, &prob) in probs.iter().enumerate().rev() {
            if prob > 0.0 {
                return Ok(i);
            }
        }

        Err(SamplingError::NoValidTokens)
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}
