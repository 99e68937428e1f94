//! Application state and configuration.

use melodia_engine::ServingState;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Application state shared across handlers.
///
/// The serving state is read-only after startup; the semaphore is the only
/// piece with runtime behavior.
#[derive(Clone)]
pub struct AppState {
    /// Loaded model + vocabulary + device, initialized once at startup.
    pub serving: Arc<ServingState>,
    /// Server configuration.
    pub config: ServerConfig,
    /// Caps concurrent generation runs; requests beyond it get 503.
    pub capacity: Arc<Semaphore>,
}

impl AppState {
    pub fn new(serving: Arc<ServingState>, config: ServerConfig) -> Self {
        let capacity = Arc::new(Semaphore::new(config.max_concurrent));
        Self {
            serving,
            config,
            capacity,
        }
    }
}

/// Server configuration parameters.
#[derive(Clone)]
pub struct ServerConfig {
    /// Delimiter the raw sequence is split on before being returned.
    ///
    /// The reference implementation splits on the literal two-character
    /// sequence `/n/n`, an escaped-newline lookalike that is probably a
    /// latent bug (ABC corpora delimit tunes with real blank lines). The
    /// default preserves that behavior; operators can pass a real
    /// delimiter instead.
    pub tune_delimiter: String,
    /// Sampling temperature when the request does not supply one.
    pub default_temperature: f32,
    /// Maximum concurrent generation runs.
    pub max_concurrent: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tune_delimiter: "/n/n".to_string(),
            default_temperature: 1.0,
            max_concurrent: 4,
        }
    }
}
