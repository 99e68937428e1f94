//! Request/response types.

mod generate;

pub use generate::{GenerateRequest, GenerateResponse};
