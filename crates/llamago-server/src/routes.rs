//! Route table and middleware stack.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::cors::{OriginPolicy, allowed_hosts, cors_layer, preflight};
use crate::ollama_handlers as ollama;
use crate::openai;
use crate::state::ApiState;

/// Build the full HTTP router.
///
/// `bound` is the listener's address; the allowed-host check only applies
/// when it is a loopback address. `GET` routes also answer `HEAD`.
pub fn create_router(state: ApiState, bound: Option<SocketAddr>) -> Router {
    let policy = Arc::new(OriginPolicy::new(state.config.allowed_origins()));

    Router::new()
        .route("/", get(ollama::root))
        .route("/api/version", get(ollama::version))
        // Ollama-style
        .route("/api/ps", get(ollama::ps))
        .route("/api/list", get(ollama::list))
        .route("/api/tags", get(ollama::list))
        .route("/api/show", post(ollama::show))
        .route("/api/generate", post(ollama::generate))
        .route("/api/chat", post(ollama::chat))
        .route("/api/embed", post(ollama::embed))
        .route("/api/embeddings", post(ollama::embeddings))
        // OpenAI-style
        .route("/v1/chat/completions", post(openai::chat_completions))
        .route("/v1/completions", post(openai::completions))
        .route("/v1/embeddings", post(openai::embeddings))
        .route("/v1/models", get(openai::list_models_openai))
        .route(
            "/v1/models/{model}",
            get(openai::retrieve_model).post(openai::retrieve_model),
        )
        .fallback(not_found)
        .with_state(state)
        .layer(middleware::from_fn_with_state(bound, allowed_hosts))
        .layer(cors_layer(Arc::clone(&policy)))
        .layer(middleware::from_fn_with_state(policy, preflight))
        .layer(TraceLayer::new_for_http())
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "404 page not found")
}
