//! HTTP error handling and response mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use melodia_engine::GenerateError;
use melodia_sampling::SamplingError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("generation error: {0}")]
    Generate(#[from] GenerateError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("server at capacity")]
    ServiceUnavailable,

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            // Client-input errors.
            ServerError::Generate(GenerateError::UnknownSymbol(c)) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                format!("character {c:?} not in vocabulary"),
            ),
            ServerError::Generate(GenerateError::InvalidLength(n)) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                format!("length must be non-negative, got {n}"),
            ),
            ServerError::Generate(GenerateError::Sampling(SamplingError::InvalidTemperature)) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "temperature must be > 0".to_string(),
            ),
            ServerError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request_error", msg)
            }

            // Everything else from generation is an internal failure;
            // requests are stateless at this boundary so retry is safe.
            ServerError::Generate(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                e.to_string(),
            ),
            ServerError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "server_error", msg)
            }

            ServerError::ServiceUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "server_error",
                "Server at capacity, try again later".to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "message": message,
                "type": error_type,
            }
        }));

        (status, body).into_response()
    }
}
