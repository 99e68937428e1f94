//! # melodia-model
//!
//! The recurrent sequence model behind the melodia generator: a
//! single-layer LSTM with a learned character embedding and a linear output
//! projection, plus checkpoint loading.
//!
//! ## Design Notes
//!
//! ### Explicit state threading
//! `step` is a pure function over an explicit [`HiddenState`] value:
//! `step(index, state) -> (logits, new_state)`. The caller owns the state
//! and threads it between steps, so concurrent generation runs cannot
//! observe each other's recurrent memory.
//!
//! ### Inference only
//! There is no training path and no gradient bookkeeping anywhere in this
//! crate; parameters are immutable after construction.

use std::fmt;

pub mod checkpoint;

pub use checkpoint::MappedFile;

/// Error type for model construction and inference.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Checkpoint artifact missing, unreadable or corrupted. Fatal at
    /// startup; never recoverable per-request.
    #[error("checkpoint load failed: {0}")]
    CheckpointLoad(String),

    /// A checkpoint tensor's shape disagrees with the declared dimensions.
    #[error("shape mismatch for {name}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("unsupported dtype: {0}")]
    UnsupportedDtype(String),

    /// Input index outside the embedding table. Indices fed to `step` come
    /// from the vocabulary or the sampler, so this is an internal invariant
    /// violation.
    #[error("index {0} outside embedding table of size {1}")]
    IndexOutOfRange(usize, usize),
}

pub type ModelResult<T> = std::result::Result<T, ModelError>;

/// Fixed model dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LstmConfig {
    /// Vocabulary size; must equal the serving vocabulary's cardinality.
    pub vocab_size: usize,
    /// Embedding width.
    pub embedding_dim: usize,
    /// Hidden width of the LSTM cell.
    pub hidden_dim: usize,
}

impl LstmConfig {
    /// Embedding width of the reference checkpoint.
    pub const REFERENCE_EMBEDDING_DIM: usize = 256;
    /// Hidden width of the reference checkpoint.
    pub const REFERENCE_HIDDEN_DIM: usize = 2048;

    /// The reference configuration: fixed hyperparameters, vocabulary size
    /// derived from the loaded vocabulary.
    pub fn reference(vocab_size: usize) -> Self {
        Self {
            vocab_size,
            embedding_dim: Self::REFERENCE_EMBEDDING_DIM,
            hidden_dim: Self::REFERENCE_HIDDEN_DIM,
        }
    }
}

/// Compute device the model runs on.
///
/// `select` is the single place accelerator preference lives: it prefers an
/// accelerator backend when one is compiled in and falls back to CPU. This
/// build is CPU-only, so it always selects [`Device::Cpu`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
}

impl Device {
    pub fn select() -> Self {
        Device::Cpu
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
        }
    }
}

/// The LSTM recurrent memory: the `(h, c)` pair, logically shaped
/// `(1 layer, batch=1, hidden)` and stored flat.
///
/// A fresh zero state starts every generation run. The state is owned by
/// exactly one run and moves through `step` by value.
#[derive(Debug, Clone, PartialEq)]
pub struct HiddenState {
    pub h: Vec<f32>,
    pub c: Vec<f32>,
}

impl HiddenState {
    /// All-zero state for a batch of one.
    pub fn zeros(hidden_dim: usize) -> Self {
        Self {
            h: vec![0.0; hidden_dim],
            c: vec![0.0; hidden_dim],
        }
    }
}

/// Single-layer LSTM: embedding -> LSTM cell -> linear projection to vocab
/// logits.
///
/// Weights are flat row-major `Vec<f32>` in the PyTorch layout, so a
/// converted reference checkpoint loads without any transposition:
/// - `embeddings`: `[vocab, embedding]`
/// - `w_ih`: `[4*hidden, embedding]`, `w_hh`: `[4*hidden, hidden]`
/// - `b_ih`, `b_hh`: `[4*hidden]` (gate order i, f, g, o)
/// - `w_out`: `[vocab, hidden]`, `b_out`: `[vocab]`
pub struct LstmModel {
    pub config: LstmConfig,
    embeddings: Vec<f32>,
    w_ih: Vec<f32>,
    w_hh: Vec<f32>,
    b_ih: Vec<f32>,
    b_hh: Vec<f32>,
    w_out: Vec<f32>,
    b_out: Vec<f32>,
}

/// Simple seeded RNG for deterministic weight initialization (xorshift64).
struct WeightRng {
    state: u64,
}

impl WeightRng {
    fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    fn next_f32(&mut self) -> f32 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        // Small magnitude weights for stability
        ((self.state >> 40) as f32 / (1u64 << 24) as f32 - 0.5) * 0.2
    }

    fn fill(&mut self, n: usize) -> Vec<f32> {
        (0..n).map(|_| self.next_f32()).collect()
    }
}

impl LstmModel {
    /// Build a model with small deterministic pseudo-random weights.
    /// Used by tests and demos; real serving loads a checkpoint.
    pub fn seeded(config: LstmConfig, seed: u64) -> Self {
        let mut rng = WeightRng::new(seed);
        let v = config.vocab_size;
        let e = config.embedding_dim;
        let h = config.hidden_dim;

        Self {
            embeddings: rng.fill(v * e),
            w_ih: rng.fill(4 * h * e),
            w_hh: rng.fill(4 * h * h),
            b_ih: rng.fill(4 * h),
            b_hh: rng.fill(4 * h),
            w_out: rng.fill(v * h),
            b_out: rng.fill(v),
            config,
        }
    }

    /// Construct a model from raw parameter tensors. Every tensor length is
    /// validated against the configuration.
    pub fn from_parameters(
        config: LstmConfig,
        embeddings: Vec<f32>,
        w_ih: Vec<f32>,
        w_hh: Vec<f32>,
        b_ih: Vec<f32>,
        b_hh: Vec<f32>,
        w_out: Vec<f32>,
        b_out: Vec<f32>,
    ) -> ModelResult<Self> {
        let v = config.vocab_size;
        let e = config.embedding_dim;
        let h = config.hidden_dim;

        check_len("embeddings.weight", &embeddings, &[v, e])?;
        check_len("lstm.weight_ih_l0", &w_ih, &[4 * h, e])?;
        check_len("lstm.weight_hh_l0", &w_hh, &[4 * h, h])?;
        check_len("lstm.bias_ih_l0", &b_ih, &[4 * h])?;
        check_len("lstm.bias_hh_l0", &b_hh, &[4 * h])?;
        check_len("linear.weight", &w_out, &[v, h])?;
        check_len("linear.bias", &b_out, &[v])?;

        Ok(Self {
            config,
            embeddings,
            w_ih,
            w_hh,
            b_ih,
            b_hh,
            w_out,
            b_out,
        })
    }

    /// Load parameters from a checkpoint file (see [`checkpoint`] for the
    /// format). Any missing tensor, dtype or shape mismatch is fatal.
    pub fn from_checkpoint(path: &std::path::Path, config: LstmConfig) -> ModelResult<Self> {
        checkpoint::load(path, config)
    }

    /// Write this model's parameters as a checkpoint file. Used by tests
    /// and conversion tooling.
    pub fn save_checkpoint(&self, path: &std::path::Path) -> ModelResult<()> {
        checkpoint::save(self, path)
    }

    /// Fresh all-zero recurrent state for one generation run.
    pub fn init_hidden(&self) -> HiddenState {
        HiddenState::zeros(self.config.hidden_dim)
    }

    /// One inference step: embed `index`, advance the LSTM cell, project to
    /// vocabulary logits.
    ///
    /// Returns unnormalized logits of vocabulary length and the updated
    /// state. No activation is applied to the logits; normalization is the
    /// sampler's job.
    pub fn step(&self, index: usize, state: HiddenState) -> ModelResult<(Vec<f32>, HiddenState)> {
        let v = self.config.vocab_size;
        let e = self.config.embedding_dim;
        let h = self.config.hidden_dim;

        if index >= v {
            return Err(ModelError::IndexOutOfRange(index, v));
        }

        let x = &self.embeddings[index * e..(index + 1) * e];

        // gates = W_ih @ x + b_ih + W_hh @ h + b_hh, length 4*hidden,
        // gate order i, f, g, o (matches the reference checkpoint).
        let mut gates = vec![0.0f32; 4 * h];
        for (k, gate) in gates.iter_mut().enumerate() {
            let mut acc = self.b_ih[k] + self.b_hh[k];
            let w_row = &self.w_ih[k * e..(k + 1) * e];
            for (wj, xj) in w_row.iter().zip(x) {
                acc += wj * xj;
            }
            let u_row = &self.w_hh[k * h..(k + 1) * h];
            for (uj, hj) in u_row.iter().zip(&state.h) {
                acc += uj * hj;
            }
            *gate = acc;
        }

        let mut next = HiddenState::zeros(h);
        for j in 0..h {
            let i_g = sigmoid(gates[j]);
            let f_g = sigmoid(gates[h + j]);
            let g_g = gates[2 * h + j].tanh();
            let o_g = sigmoid(gates[3 * h + j]);

            let c = f_g * state.c[j] + i_g * g_g;
            next.c[j] = c;
            next.h[j] = o_g * c.tanh();
        }

        // logits = W_out @ h' + b_out
        let mut logits = vec![0.0f32; v];
        for (i, logit) in logits.iter_mut().enumerate() {
            let row = &self.w_out[i * h..(i + 1) * h];
            let mut acc = self.b_out[i];
            for (wj, hj) in row.iter().zip(&next.h) {
                acc += wj * hj;
            }
            *logit = acc;
        }

        Ok((logits, next))
    }

    pub(crate) fn parameters(&self) -> [(&'static str, &[f32], Vec<usize>); 7] {
        let v = self.config.vocab_size;
        let e = self.config.embedding_dim;
        let h = self.config.hidden_dim;
        [
            ("embeddings.weight", &self.embeddings, vec![v, e]),
            ("lstm.weight_ih_l0", &self.w_ih, vec![4 * h, e]),
            ("lstm.weight_hh_l0", &self.w_hh, vec![4 * h, h]),
            ("lstm.bias_ih_l0", &self.b_ih, vec![4 * h]),
            ("lstm.bias_hh_l0", &self.b_hh, vec![4 * h]),
            ("linear.weight", &self.w_out, vec![v, h]),
            ("linear.bias", &self.b_out, vec![v]),
        ]
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn check_len(name: &str, data: &[f32], shape: &[usize]) -> ModelResult<()> {
    let expected: usize = shape.iter().product();
    if data.len() != expected {
        return Err(ModelError::ShapeMismatch {
            name: name.to_string(),
            expected: shape.to_vec(),
            got: vec![data.len()],
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_config() -> LstmConfig {
        LstmConfig {
            vocab_size: 5,
            embedding_dim: 4,
            hidden_dim: 3,
        }
    }

    #[test]
    fn step_returns_vocab_size_logits() {
        let model = LstmModel::seeded(tiny_config(), 7);
        let (logits, state) = model.step(0, model.init_hidden()).unwrap();
        assert_eq!(logits.len(), 5);
        assert_eq!(state.h.len(), 3);
        assert_eq!(state.c.len(), 3);
        assert!(logits.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn step_is_deterministic() {
        let model = LstmModel::seeded(tiny_config(), 7);
        let (l1, s1) = model.step(2, model.init_hidden()).unwrap();
        let (l2, s2) = model.step(2, model.init_hidden()).unwrap();
        assert_eq!(l1, l2);
        assert_eq!(s1, s2);
    }

    #[test]
    fn state_actually_advances() {
        let model = LstmModel::seeded(tiny_config(), 7);
        let zero = model.init_hidden();
        let (_, s1) = model.step(1, zero.clone()).unwrap();
        assert_ne!(s1, zero);

        // Feeding the same index with different states gives different logits.
        let (l_fresh, _) = model.step(1, zero).unwrap();
        let (l_warm, _) = model.step(1, s1).unwrap();
        assert_ne!(l_fresh, l_warm);
    }

    #[test]
    fn init_hidden_is_zero() {
        let model = LstmModel::seeded(tiny_config(), 7);
        let state = model.init_hidden();
        assert!(state.h.iter().all(|&v| v == 0.0));
        assert!(state.c.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn out_of_range_index_rejected() {
        let model = LstmModel::seeded(tiny_config(), 7);
        assert!(matches!(
            model.step(5, model.init_hidden()),
            Err(ModelError::IndexOutOfRange(5, 5))
        ));
    }

    #[test]
    fn from_parameters_validates_shapes() {
        let c = tiny_config();
        let result = LstmModel::from_parameters(
            c.clone(),
            vec![0.0; c.vocab_size * c.embedding_dim],
            vec![0.0; 4 * c.hidden_dim * c.embedding_dim],
            vec![0.0; 4 * c.hidden_dim * c.hidden_dim],
            vec![0.0; 4 * c.hidden_dim],
            vec![0.0; 4 * c.hidden_dim],
            vec![0.0; 1], // wrong
            vec![0.0; c.vocab_size],
        );
        assert!(matches!(
            result,
            Err(ModelError::ShapeMismatch { ref name, .. }) if name == "linear.weight"
        ));
    }
}
