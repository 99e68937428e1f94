//! Generation handler.

use axum::{extract::State, Json};
use melodia_sampling::Sampler;

use crate::{
    error::ServerError,
    models::{GenerateRequest, GenerateResponse},
    state::AppState,
};

/// Handle generation requests.
///
/// The generation loop is synchronous CPU-bound compute with no suspension
/// points, so it runs on the blocking thread pool. A semaphore permit caps
/// concurrent runs; requests beyond capacity get 503 rather than queueing
/// unboundedly. Each run owns its own hidden state, so concurrent requests
/// only contend for compute, never for state.
pub async fn handle_generate(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ServerError> {
    let mut chars = req.start_char.chars();
    let seed_char = match (chars.next(), chars.next()) {
        (Some(c), None) => c,
        _ => {
            return Err(ServerError::InvalidRequest(format!(
                "start_char must be exactly one character, got {:?}",
                req.start_char
            )))
        }
    };

    let seed = req.seed.unwrap_or_else(entropy_seed);
    let temperature = req.temperature.unwrap_or(state.config.default_temperature);

    let permit = state
        .capacity
        .clone()
        .try_acquire_owned()
        .map_err(|_| ServerError::ServiceUnavailable)?;

    tracing::debug!(%seed_char, length = req.length, seed, temperature, "generation started");

    let serving = state.serving.clone();
    let length = req.length;
    let sequence = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        let mut sampler = Sampler::new().with_seed(seed).with_temperature(temperature);
        serving.generate(seed_char, length, &mut sampler)
    })
    .await
    .map_err(|e| ServerError::Internal(format!("generation task failed: {e}")))??;

    // Post-processing: split the raw sequence into tunes. The split may
    // yield one chunk (no delimiter present) or many; empty chunks pass
    // through unchanged, matching the reference behavior.
    let tunes: Vec<String> = sequence
        .text()
        .split(state.config.tune_delimiter.as_str())
        .map(str::to_string)
        .collect();

    tracing::debug!(symbols = sequence.len(), tunes = tunes.len(), "generation finished");

    Ok(Json(GenerateResponse {
        abc_notation: tunes,
    }))
}

/// Seed for requests that don't pin one: clock-derived entropy. Collisions
/// are harmless; the seed only drives sampling diversity.
fn entropy_seed() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x9E37_79B9_7F4A_7C15)
}
