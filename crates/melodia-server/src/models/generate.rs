//! Generation request/response types.

use serde::{Deserialize, Serialize};

/// Generation request.
///
/// `length` is signed so that negative values reach the engine's own
/// validation (and a clean 400) instead of failing JSON deserialization
/// opaquely.
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    /// Seed character the sequence starts from.
    pub start_char: String,
    /// Number of characters to sample after the seed.
    pub length: i64,
    /// Fixed sampler seed for reproducible output. Fresh entropy when
    /// absent.
    pub seed: Option<u64>,
    /// Sampling temperature; server default when absent.
    pub temperature: Option<f32>,
}

/// Generation response: the raw sequence split into tunes on the configured
/// delimiter. May hold zero, one, or many entries.
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub abc_notation: Vec<String>,
}
