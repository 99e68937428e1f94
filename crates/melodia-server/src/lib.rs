//! # melodia-server
//!
//! HTTP API around the melodia generation engine.
//!
//! Exposes `POST /generate` (seed character + length in, tune list out) and
//! `GET /health`, with permissive CORS so local frontends can call it
//! directly. The generation loop is synchronous CPU-bound compute, so
//! handlers run it on the blocking thread pool and a semaphore caps
//! concurrent generations.

pub mod error;
pub mod handlers;
pub mod models;
pub mod server;
pub mod state;

pub use error::ServerError;
pub use server::{create_router, run_server};
pub use state::{AppState, ServerConfig};
