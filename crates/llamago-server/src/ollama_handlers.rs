//! Ollama-native API route handlers.
//!
//! Each inference handler decodes the body, checks the model name, takes
//! the unload/load shortcuts when the request carries no work, and
//! otherwise calls the engine through the [`llamago_core::EngineGate`].
//! The `run_*` functions hold that shared logic so the OpenAI routes can
//! reuse it with their own request and response shapes.

use std::time::{Duration, Instant};

use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use llamago_core::{ChatMessage, EmbedInput, embedding};

use crate::error::ApiError;
use crate::ollama_models::*;
use crate::ollama_stream::ndjson_response;
use crate::state::ApiState;
use crate::template::generate_values;

const UNLOAD_RESPONSE: &str = "Not currently supported";
const RAW_CONFLICT: &str = "raw mode does not support template, system, or context";

/// Result of an inference request: either produced by the engine or a
/// synthetic reply for a request that carried no work.
#[derive(Debug)]
pub(crate) enum Reply<T> {
    Shortcut(T),
    Generated(T),
}

impl<T> Reply<T> {
    pub(crate) fn into_inner(self) -> T {
        match self {
            Self::Shortcut(inner) | Self::Generated(inner) => inner,
        }
    }
}

impl<T: Serialize + Unpin + Send + 'static> Reply<T> {
    /// Shortcuts are always a single JSON object; generated replies are
    /// NDJSON-framed when the client streams.
    fn deliver(self, stream: bool) -> Response {
        match self {
            Self::Generated(body) if stream => ndjson_response(body),
            Self::Shortcut(body) | Self::Generated(body) => Json(body).into_response(),
        }
    }
}

// ── GET / ──────────────────────────────────────────────────────────────

pub(crate) async fn root() -> impl IntoResponse {
    ROOT_RESPONSE
}

// ── GET /api/version ───────────────────────────────────────────────────

pub(crate) async fn version() -> impl IntoResponse {
    Json(VersionResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ── GET /api/ps ────────────────────────────────────────────────────────

/// No model registry is tracked, so the list is always empty.
pub(crate) async fn ps() -> impl IntoResponse {
    debug!("GET /api/ps");
    let mut models: Vec<ProcessModel> = Vec::new();
    // longest duration remaining listed first
    models.sort_by(|a, b| b.expires_at.cmp(&a.expires_at));
    Json(ProcessResponse { models })
}

// ── GET /api/list, GET /api/tags ───────────────────────────────────────

pub(crate) async fn list() -> impl IntoResponse {
    debug!("GET /api/list");
    Json(list_models())
}

pub(crate) fn list_models() -> ListResponse {
    let mut models: Vec<ListModel> = Vec::new();
    // most recently modified first
    models.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
    ListResponse { models }
}

// ── POST /api/show ─────────────────────────────────────────────────────

pub(crate) async fn show(body: Bytes) -> Result<Response, ApiError> {
    let req: ShowRequest = decode_body(&body)?;
    let name = req.effective_model();
    debug!(model = %name, "POST /api/show");
    if name.is_empty() {
        return Err(ApiError::BadRequest("model is required".to_string()));
    }
    Err(ApiError::BadRequest("No support".to_string()))
}

// ── POST /api/generate ─────────────────────────────────────────────────

pub(crate) async fn generate(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let req: GenerateRequest = decode_body(&body)?;
    let stream = req.stream.unwrap_or(true);
    info!(model = %req.model, raw = req.raw, streaming = stream, "POST /api/generate");

    Ok(run_generate(&state, req).await?.deliver(stream))
}

pub(crate) async fn run_generate(
    state: &ApiState,
    req: GenerateRequest,
) -> Result<Reply<GenerateResponse>, ApiError> {
    let start = Instant::now();
    state.check_model(&req.model)?;
    let model = state.response_model(&req.model);

    if req.prompt.is_empty() && req.keep_alive.is_some_and(KeepAlive::is_zero) {
        return Ok(Reply::Shortcut(GenerateResponse {
            model,
            created_at: Utc::now(),
            response: UNLOAD_RESPONSE.to_string(),
            done: true,
            done_reason: Some("unload".to_string()),
            total_duration: 0,
            load_duration: 0,
        }));
    }

    if req.raw && (!req.template.is_empty() || !req.system.is_empty() || !req.context.is_empty())
    {
        return Err(ApiError::BadRequest(RAW_CONFLICT.to_string()));
    }

    let loaded = start.elapsed();

    if req.prompt.is_empty() {
        return Ok(Reply::Shortcut(GenerateResponse {
            model,
            created_at: Utc::now(),
            response: String::new(),
            done: true,
            done_reason: Some("load".to_string()),
            total_duration: 0,
            load_duration: 0,
        }));
    }

    let prompt = if req.raw {
        req.prompt
    } else {
        let values = generate_values(&req.prompt, &req.suffix, &req.system, req.images.len());
        state
            .template
            .render(&req.template, &values)
            .map_err(|e| ApiError::Internal(e.to_string()))?
    };

    let response = state.gate.generate(prompt).await?;

    Ok(Reply::Generated(GenerateResponse {
        model,
        created_at: Utc::now(),
        response,
        done: true,
        done_reason: Some("stop".to_string()),
        total_duration: nanos(start.elapsed()),
        load_duration: nanos(loaded),
    }))
}

// ── POST /api/chat ─────────────────────────────────────────────────────

pub(crate) async fn chat(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let req: ChatRequest = decode_body(&body)?;
    let stream = req.stream.unwrap_or(true);
    info!(model = %req.model, messages = req.messages.len(), streaming = stream, "POST /api/chat");

    Ok(run_chat(&state, req).await?.deliver(stream))
}

pub(crate) async fn run_chat(
    state: &ApiState,
    req: ChatRequest,
) -> Result<Reply<ChatResponse>, ApiError> {
    let start = Instant::now();
    state.check_model(&req.model)?;
    let model = state.response_model(&req.model);

    if req.messages.is_empty() && req.keep_alive.is_some_and(KeepAlive::is_zero) {
        return Ok(Reply::Shortcut(ChatResponse {
            model,
            created_at: Utc::now(),
            message: ChatMessage::new("assistant", UNLOAD_RESPONSE),
            done: true,
            done_reason: Some("unload".to_string()),
            total_duration: 0,
            load_duration: 0,
        }));
    }

    let loaded = start.elapsed();

    if req.messages.is_empty() {
        return Ok(Reply::Shortcut(ChatResponse {
            model,
            created_at: Utc::now(),
            message: ChatMessage::new("assistant", ""),
            done: true,
            done_reason: Some("load".to_string()),
            total_duration: 0,
            load_duration: 0,
        }));
    }

    let content = state.gate.chat(req.messages).await?;

    Ok(Reply::Generated(ChatResponse {
        model,
        created_at: Utc::now(),
        message: ChatMessage::new("assistant", content),
        done: true,
        done_reason: Some("stop".to_string()),
        total_duration: nanos(start.elapsed()),
        load_duration: nanos(loaded),
    }))
}

// ── POST /api/embed ────────────────────────────────────────────────────

pub(crate) async fn embed(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<Json<EmbedResponse>, ApiError> {
    let start = Instant::now();
    let req: EmbedRequest = decode_body(&body)?;
    info!(model = %req.model, "POST /api/embed");

    state.check_model(&req.model)?;
    let inputs = EmbedInput::from_json(req.input)?
        .map(EmbedInput::into_inputs)
        .unwrap_or_default();

    run_embed(&state, &req.model, inputs, start).await.map(Json)
}

pub(crate) async fn run_embed(
    state: &ApiState,
    requested_model: &str,
    inputs: Vec<String>,
    start: Instant,
) -> Result<EmbedResponse, ApiError> {
    let model = state.response_model(requested_model);
    let loaded = start.elapsed();

    if inputs.is_empty() {
        return Ok(EmbedResponse {
            model,
            embeddings: Vec::new(),
            total_duration: 0,
            load_duration: 0,
            prompt_eval_count: 0,
        });
    }

    let joined = embedding::join_inputs(&inputs, &state.config.embd_separator);
    let raw = state
        .gate
        .embed(joined, llamago_core::EmbeddingFormat::Array)
        .await?;
    let embeddings = embedding::parse_vectors(&raw, inputs.len())?;

    Ok(EmbedResponse {
        model,
        embeddings,
        total_duration: nanos(start.elapsed()),
        load_duration: nanos(loaded),
        prompt_eval_count: inputs.len() as u64,
    })
}

// ── POST /api/embeddings (legacy) ──────────────────────────────────────

/// Legacy `/api/embeddings`: one prompt, one vector.
pub(crate) async fn embeddings(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<Json<EmbeddingResponse>, ApiError> {
    let req: EmbeddingRequest = decode_body(&body)?;
    info!(model = %req.model, "POST /api/embeddings");

    state.check_model(&req.model)?;
    if req.prompt.is_empty() {
        return Ok(Json(EmbeddingResponse {
            embedding: Vec::new(),
        }));
    }

    let raw = state
        .gate
        .embed(req.prompt, llamago_core::EmbeddingFormat::Array)
        .await?;
    let vectors: Vec<Vec<f32>> = serde_json::from_str(raw.trim())
        .map_err(|e| ApiError::Internal(e.to_string().trim().to_string()))?;
    let embedding = vectors
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::Internal("engine returned no embeddings".to_string()))?;

    Ok(Json(EmbeddingResponse { embedding }))
}

// ── Shared Helpers ─────────────────────────────────────────────────────

/// Decode a JSON body, treating an empty body as its own error.
pub(crate) fn decode_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::BadRequest("missing request body".to_string()));
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// Duration in whole nanoseconds, saturating.
pub(crate) fn nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}
