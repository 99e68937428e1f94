//! # melodia-vocab
//!
//! Bidirectional character vocabulary for the melodia generator.
//!
//! The vocabulary is built once at startup from two persisted artifacts
//! (`char2idx.json` and `idx2char.json`) and is immutable afterwards. Both
//! mappings must be exact inverses of each other; loading verifies this and
//! refuses to serve from inconsistent artifacts.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Error type for vocabulary operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VocabError {
    /// Seed character not present in the vocabulary. Client-input error.
    #[error("unknown symbol: {0:?}")]
    UnknownSymbol(char),

    /// Index outside the vocabulary. Indices produced by sampling are valid
    /// by construction, so hitting this means a dimension-mismatch bug
    /// upstream, not bad user input.
    #[error("index {0} outside vocabulary of size {1}")]
    InvalidIndex(usize, usize),

    /// Artifact could not be read or parsed.
    #[error("vocabulary artifact error: {0}")]
    Artifact(String),

    /// The two artifacts are not mutual inverses.
    #[error("vocabulary artifacts are not mutual inverses: {0}")]
    Inverse(String),
}

pub type VocabResult<T> = std::result::Result<T, VocabError>;

/// Bidirectional mapping between symbols (characters) and dense indices.
///
/// Size is fixed after construction; there is no runtime insertion.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    char_to_idx: HashMap<char, usize>,
    idx_to_char: Vec<char>,
}

impl Vocabulary {
    /// Build a vocabulary from an ordered list of symbols. Index i maps to
    /// `symbols[i]`. Duplicate symbols are rejected.
    pub fn from_symbols(symbols: &[char]) -> VocabResult<Self> {
        let mut char_to_idx = HashMap::with_capacity(symbols.len());
        for (i, &c) in symbols.iter().enumerate() {
            if char_to_idx.insert(c, i).is_some() {
                return Err(VocabError::Inverse(format!(
                    "duplicate symbol {c:?} at index {i}"
                )));
            }
        }
        Ok(Self {
            char_to_idx,
            idx_to_char: symbols.to_vec(),
        })
    }

    /// Load the vocabulary from its two persisted artifacts and verify that
    /// the mappings are exact inverses of each other.
    pub fn load(char2idx_path: &Path, idx2char_path: &Path) -> VocabResult<Self> {
        let forward = read_json::<HashMap<String, usize>>(char2idx_path)?;
        let backward = read_json::<Vec<String>>(idx2char_path)?;

        let mut idx_to_char = Vec::with_capacity(backward.len());
        for (i, s) in backward.iter().enumerate() {
            let mut chars = s.chars();
            let c = chars.next().ok_or_else(|| {
                VocabError::Artifact(format!("empty symbol at index {i} in idx2char"))
            })?;
            if chars.next().is_some() {
                return Err(VocabError::Artifact(format!(
                    "multi-character symbol {s:?} at index {i} in idx2char"
                )));
            }
            idx_to_char.push(c);
        }

        let vocab = Self::from_symbols(&idx_to_char)?;

        // The forward artifact must agree with the backward one exactly.
        if forward.len() != vocab.idx_to_char.len() {
            return Err(VocabError::Inverse(format!(
                "char2idx has {} entries, idx2char has {}",
                forward.len(),
                vocab.idx_to_char.len()
            )));
        }
        for (s, &i) in &forward {
            let mut chars = s.chars();
            let c = match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => {
                    return Err(VocabError::Artifact(format!(
                        "bad symbol key {s:?} in char2idx"
                    )))
                }
            };
            if vocab.idx_to_char.get(i) != Some(&c) {
                return Err(VocabError::Inverse(format!(
                    "char2idx maps {c:?} to {i}, idx2char disagrees"
                )));
            }
        }

        Ok(vocab)
    }

    /// Look up the index for a symbol. Fails with [`VocabError::UnknownSymbol`]
    /// when absent; this runs before any model computation so bad input never
    /// reaches the numeric path.
    pub fn resolve(&self, symbol: char) -> VocabResult<usize> {
        self.char_to_idx
            .get(&symbol)
            .copied()
            .ok_or(VocabError::UnknownSymbol(symbol))
    }

    /// Look up the symbol for an index.
    pub fn unresolve(&self, index: usize) -> VocabResult<char> {
        self.idx_to_char
            .get(index)
            .copied()
            .ok_or(VocabError::InvalidIndex(index, self.idx_to_char.len()))
    }

    /// Number of symbols in the vocabulary.
    pub fn len(&self) -> usize {
        self.idx_to_char.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idx_to_char.is_empty()
    }

    pub fn contains(&self, symbol: char) -> bool {
        self.char_to_idx.contains_key(&symbol)
    }

    /// Symbols ordered by index.
    pub fn symbols(&self) -> &[char] {
        &self.idx_to_char
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> VocabResult<T> {
    let bytes = fs::read(path)
        .map_err(|e| VocabError::Artifact(format!("failed to read {}: {e}", path.display())))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| VocabError::Artifact(format!("failed to parse {}: {e}", path.display())))
}
