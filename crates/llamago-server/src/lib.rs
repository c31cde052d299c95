//! HTTP API for llamago.
//!
//! Serves an Ollama-compatible API under `/api/` and an OpenAI-compatible
//! API under `/v1/`. Every inference request goes through a single
//! [`llamago_core::EngineGate`], so the engine sees one call at a time.

mod cors;
mod error;
mod models;
mod ollama_handlers;
mod ollama_models;
mod ollama_stream;
mod openai;
mod routes;
mod server;
mod state;
mod template;

pub use cors::{ALLOW_HEADERS, OriginPolicy};
pub use error::{ApiError, error_body};
pub use ollama_models::ROOT_RESPONSE;
pub use routes::create_router;
pub use server::serve;
pub use state::ApiState;
pub use template::{DEFAULT_TEMPLATE, PromptTemplate};

#[cfg(test)]
use tokio_test as _;
