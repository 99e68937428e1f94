//! Health check handler.

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// Handle health check requests. Includes capacity utilization and the
/// device the model runs on.
pub async fn handle_health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "device": state.serving.device().to_string(),
        "vocab_size": state.serving.vocabulary().len(),
        "capacity": {
            "max_concurrent": state.config.max_concurrent,
            "available": state.capacity.available_permits(),
        }
    }))
}
