//! # melodia-engine
//!
//! The narrow waist of the melodia stack: the per-step model contract, the
//! autoregressive generation loop, and the process-wide [`ServingState`].
//!
//! ## Design Notes
//!
//! ### Explicit state threading
//! [`SequenceModel::step`] consumes and returns the recurrent state by
//! value. Each `generate` call owns its own state from zero-initialization
//! to completion, so concurrent requests over one shared model cannot
//! observe each other's recurrent memory.
//!
//! ### Shared read-only serving state
//! [`ServingState`] is built exactly once at startup and handed to request
//! handlers behind a shared reference, never ambient global mutable state.
//! If initialization fails the process must not begin serving.

use std::path::PathBuf;

use melodia_model::{Device, HiddenState, LstmConfig, LstmModel, ModelError};
use melodia_sampling::{Sampler, SamplingError};
use melodia_vocab::{VocabError, Vocabulary};

/// Errors from one generation run.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    /// Seed symbol absent from the vocabulary. Client-input error; the
    /// model is never invoked.
    #[error("unknown symbol: {0:?}")]
    UnknownSymbol(char),

    /// Negative length. Rejected before any state is created.
    #[error("length must be non-negative, got {0}")]
    InvalidLength(i64),

    /// Sampling failure; `InvalidLogits` here means upstream corruption,
    /// not bad user input.
    #[error("sampling error: {0}")]
    Sampling(#[from] SamplingError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// A sampled index failed the index->symbol lookup. Sampling is
    /// restricted to the output distribution's support, so this signals a
    /// dimension-mismatch bug, not a user error.
    #[error("internal invariant violation: {0}")]
    Invariant(VocabError),
}

/// Fatal startup errors. None of these are recoverable per-request; a
/// process hitting one must not serve.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("vocabulary load failed: {0}")]
    Vocab(#[from] VocabError),

    #[error("model load failed: {0}")]
    Model(#[from] ModelError),

    #[error("vocabulary has {vocab} symbols but model was built for {model}")]
    VocabModelMismatch { vocab: usize, model: usize },
}

/// Per-step inference contract of a recurrent sequence model.
///
/// `step(index, state) -> (logits, new_state)`: logits are a dense
/// unnormalized vector of vocabulary length; the returned state feeds the
/// next call. No side effects beyond the returned values.
pub trait SequenceModel: Send + Sync {
    /// Recurrent memory carried between steps.
    type State;

    /// Fresh zero-initialized state for one generation run (batch of one).
    fn init_state(&self) -> Self::State;

    /// One inference step.
    fn step(&self, index: usize, state: Self::State) -> Result<(Vec<f32>, Self::State), ModelError>;
}

/// Adapter: the LSTM fulfills the step contract directly.
impl SequenceModel for LstmModel {
    type State = HiddenState;

    fn init_state(&self) -> HiddenState {
        self.init_hidden()
    }

    fn step(&self, index: usize, state: HiddenState) -> Result<(Vec<f32>, HiddenState), ModelError> {
        LstmModel::step(self, index, state)
    }
}

/// Result of one generation run: the seed symbol followed by exactly
/// `length` sampled symbols. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSequence {
    text: String,
    indices: Vec<usize>,
}

impl GeneratedSequence {
    /// The full symbol sequence, seed first.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The index trail (seed index first), for diagnostics.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Number of symbols (always requested length + 1).
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Autoregressively generate `length` symbols from `seed_symbol`.
///
/// The loop resolves the seed, zero-initializes the recurrent state, then
/// runs exactly `length` iterations of step -> sample -> unresolve, feeding
/// each sampled index back in. There is no early-termination symbol; any
/// splitting of the output into logical units is the caller's
/// post-processing.
pub fn generate<M: SequenceModel>(
    model: &M,
    vocabulary: &Vocabulary,
    sampler: &mut Sampler,
    seed_symbol: char,
    length: i64,
) -> Result<GeneratedSequence, GenerateError> {
    if length < 0 {
        return Err(GenerateError::InvalidLength(length));
    }

    let seed_index = vocabulary.resolve(seed_symbol).map_err(|e| match e {
        VocabError::UnknownSymbol(c) => GenerateError::UnknownSymbol(c),
        other => GenerateError::Invariant(other),
    })?;

    let length = length as usize;
    let mut state = model.init_state();
    let mut current = seed_index;

    let mut text = String::with_capacity(length + 1);
    let mut indices = Vec::with_capacity(length + 1);
    text.push(seed_symbol);
    indices.push(seed_index);

    for _ in 0..length {
        let (logits, next_state) = model.step(current, state)?;
        state = next_state;

        current = sampler.sample(&logits)?;
        let symbol = vocabulary
            .unresolve(current)
            .map_err(GenerateError::Invariant)?;

        text.push(symbol);
        indices.push(current);
    }

    Ok(GeneratedSequence { text, indices })
}

/// Filesystem locations of the startup artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub char2idx: PathBuf,
    pub idx2char: PathBuf,
    pub checkpoint: PathBuf,
}

/// Everything a request handler needs, loaded once at startup and read-only
/// for the life of the process: the vocabulary, the model and the device
/// it runs on.
pub struct ServingState {
    vocabulary: Vocabulary,
    model: LstmModel,
    device: Device,
}

impl ServingState {
    /// Load the vocabulary and checkpoint with the reference hyperparameters
    /// (embedding 256, hidden 2048), validate that the cardinalities agree,
    /// and select a compute device. Any failure aborts initialization
    /// entirely; partial state is never exposed.
    pub fn initialize(paths: &ArtifactPaths) -> Result<Self, InitError> {
        Self::initialize_with_dims(
            paths,
            LstmConfig::REFERENCE_EMBEDDING_DIM,
            LstmConfig::REFERENCE_HIDDEN_DIM,
        )
    }

    /// [`ServingState::initialize`] with explicit embedding/hidden widths,
    /// for checkpoints trained at other sizes and for tests.
    pub fn initialize_with_dims(
        paths: &ArtifactPaths,
        embedding_dim: usize,
        hidden_dim: usize,
    ) -> Result<Self, InitError> {
        let vocabulary = Vocabulary::load(&paths.char2idx, &paths.idx2char)?;
        let config = LstmConfig {
            vocab_size: vocabulary.len(),
            embedding_dim,
            hidden_dim,
        };
        let model = LstmModel::from_checkpoint(&paths.checkpoint, config)?;
        let state = Self::from_parts(vocabulary, model)?;
        tracing::info!(
            vocab_size = state.vocabulary.len(),
            device = %state.device,
            "serving state initialized"
        );
        Ok(state)
    }

    /// Assemble serving state from an already-loaded vocabulary and model.
    /// Used by tests and embedded callers.
    pub fn from_parts(vocabulary: Vocabulary, model: LstmModel) -> Result<Self, InitError> {
        if vocabulary.len() != model.config.vocab_size {
            return Err(InitError::VocabModelMismatch {
                vocab: vocabulary.len(),
                model: model.config.vocab_size,
            });
        }
        Ok(Self {
            vocabulary,
            model,
            device: Device::select(),
        })
    }

    /// Run one generation request against the shared model. The hidden
    /// state lives entirely inside this call.
    pub fn generate(
        &self,
        seed_symbol: char,
        length: i64,
        sampler: &mut Sampler,
    ) -> Result<GeneratedSequence, GenerateError> {
        generate(&self.model, &self.vocabulary, sampler, seed_symbol, length)
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn device(&self) -> Device {
        self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vocab_model_mismatch_is_fatal() {
        let vocabulary = Vocabulary::from_symbols(&['A', 'B', 'C']).unwrap();
        let config = LstmConfig {
            vocab_size: 4,
            embedding_dim: 2,
            hidden_dim: 2,
        };
        let model = LstmModel::seeded(config, 1);
        assert!(matches!(
            ServingState::from_parts(vocabulary, model),
            Err(InitError::VocabModelMismatch { vocab: 3, model: 4 })
        ));
    }
}
