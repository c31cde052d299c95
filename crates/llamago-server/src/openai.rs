//! OpenAI-compatible `/v1/` handlers.
//!
//! Requests are translated into their Ollama counterparts and run through
//! the same code paths, so model checks, shortcuts and engine errors
//! behave identically on both route trees.

use std::convert::Infallible;
use std::time::Instant;

use axum::{
    Json,
    extract::{Path, State},
    response::{
        IntoResponse, Response,
        sse::{Event, Sse},
    },
};
use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info};

use llamago_core::EmbedInput;

use crate::error::ApiError;
use crate::models::{
    ChatCompletionRequest, ChatCompletionResponse, CompletionRequest, CompletionResponse,
    EmbeddingsRequest, EmbeddingsResponse, ModelsResponse,
};
use crate::ollama_handlers::{decode_body, list_models, run_chat, run_embed, run_generate};
use crate::ollama_models::{ChatRequest, GenerateRequest};
use crate::state::ApiState;

pub(crate) async fn chat_completions(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let req: ChatCompletionRequest = decode_body(&body)?;
    info!(model = %req.model, messages = req.messages.len(), stream = req.stream, "POST /v1/chat/completions");

    let stream = req.stream;
    let chat = ChatRequest {
        model: req.model,
        messages: req.messages,
        stream: Some(false),
        ..ChatRequest::default()
    };
    let reply = run_chat(&state, chat).await?.into_inner();
    let completion = ChatCompletionResponse::new(
        reply.model,
        reply.message.content,
        reply.done_reason.unwrap_or_else(|| "stop".to_string()),
    );

    if stream {
        sse_once(&completion.into_chunk())
    } else {
        Ok(Json(completion).into_response())
    }
}

pub(crate) async fn completions(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let req: CompletionRequest = decode_body(&body)?;
    info!(model = %req.model, stream = req.stream, "POST /v1/completions");

    let stream = req.stream;
    let generate = GenerateRequest {
        model: req.model,
        prompt: req.prompt,
        suffix: req.suffix,
        stream: Some(false),
        ..GenerateRequest::default()
    };
    let reply = run_generate(&state, generate).await?.into_inner();
    let completion = CompletionResponse::new(
        reply.model,
        reply.response,
        reply.done_reason.unwrap_or_else(|| "stop".to_string()),
    );

    if stream {
        sse_once(&completion.into_chunk())
    } else {
        Ok(Json(completion).into_response())
    }
}

pub(crate) async fn embeddings(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<Json<EmbeddingsResponse>, ApiError> {
    let start = Instant::now();
    let req: EmbeddingsRequest = decode_body(&body)?;
    info!(model = %req.model, "POST /v1/embeddings");

    state.check_model(&req.model)?;
    let inputs = EmbedInput::from_json(req.input)?
        .map(EmbedInput::into_inputs)
        .unwrap_or_default();
    if inputs.is_empty() {
        return Err(ApiError::BadRequest("invalid input".to_string()));
    }

    let resp = run_embed(&state, &req.model, inputs, start).await?;
    Ok(Json(EmbeddingsResponse::new(
        resp.model,
        resp.embeddings,
        resp.prompt_eval_count,
    )))
}

pub(crate) async fn list_models_openai() -> impl IntoResponse {
    debug!("GET /v1/models");
    Json(ModelsResponse::from(list_models()))
}

/// `/v1/models/{model}` is registered but model metadata is not served.
pub(crate) async fn retrieve_model(Path(model): Path<String>) -> ApiError {
    debug!(%model, "/v1/models/{{model}}");
    ApiError::BadRequest("No support".to_string())
}

/// An SSE body with one data event followed by the `[DONE]` sentinel.
fn sse_once<T: Serialize>(chunk: &T) -> Result<Response, ApiError> {
    let event = Event::default()
        .json_data(chunk)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let events = [event, Event::default().data("[DONE]")];
    let stream = futures_util::stream::iter(events.into_iter().map(Ok::<_, Infallible>));
    Ok(Sse::new(stream).into_response())
}
