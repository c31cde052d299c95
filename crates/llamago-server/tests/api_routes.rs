//! Route-level tests for the Ollama- and OpenAI-compatible APIs.

mod common;

use std::sync::Arc;

use axum::http::{StatusCode, header};
use common::{MODEL_NAME, get, loading_router, post_json, router};
use llamago_core::testing::StubEngine;
use serde_json::json;

fn stub() -> Arc<StubEngine> {
    Arc::new(StubEngine::new().with_reply("Rayleigh scattering."))
}

// ── General ────────────────────────────────────────────────────────────

#[tokio::test]
async fn root_reports_running() {
    let res = get(router(&stub()), "/").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.text(), "Llamago is running");
}

#[tokio::test]
async fn version_is_crate_version() {
    let res = get(router(&stub()), "/api/version").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn ps_list_and_tags_are_empty() {
    let engine = stub();
    for uri in ["/api/ps", "/api/list", "/api/tags"] {
        let res = get(router(&engine), uri).await;
        assert_eq!(res.status, StatusCode::OK, "{uri}");
        assert_eq!(res.json()["models"], json!([]), "{uri}");
    }
}

#[tokio::test]
async fn unknown_route_is_404() {
    let res = get(router(&stub()), "/api/pull").await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

// ── /api/generate ──────────────────────────────────────────────────────

#[tokio::test]
async fn generate_non_streaming_returns_engine_text() {
    let engine = stub();
    let res = post_json(
        router(&engine),
        "/api/generate",
        json!({"model": MODEL_NAME, "prompt": "Why is the sky blue?", "stream": false}),
    )
    .await;

    assert_eq!(res.status, StatusCode::OK);
    let body = res.json();
    assert_eq!(body["response"], "Rayleigh scattering.");
    assert_eq!(body["done"], true);
    assert_eq!(body["done_reason"], "stop");
    assert_eq!(body["model"], MODEL_NAME);
    assert!(body["total_duration"].as_u64().unwrap() > 0);

    let prompt = engine.last_prompt().unwrap();
    assert!(prompt.contains("<|im_start|>user\nWhy is the sky blue?<|im_end|>"));
    assert!(prompt.ends_with("<|im_start|>assistant"));
}

#[tokio::test]
async fn generate_streams_ndjson_by_default() {
    let res = post_json(
        router(&stub()),
        "/api/generate",
        json!({"prompt": "hello"}),
    )
    .await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.headers[header::CONTENT_TYPE], "application/x-ndjson");
    let text = res.text();
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines.len(), 1);
    let frame: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(frame["response"], "Rayleigh scattering.");
    assert_eq!(frame["done"], true);
}

#[tokio::test]
async fn generate_raw_sends_prompt_verbatim() {
    let engine = stub();
    let res = post_json(
        router(&engine),
        "/api/generate",
        json!({"prompt": "[INST] hi [/INST]", "raw": true, "stream": false}),
    )
    .await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(engine.last_prompt().as_deref(), Some("[INST] hi [/INST]"));
}

#[tokio::test]
async fn generate_raw_with_system_is_rejected() {
    let engine = stub();
    let res = post_json(
        router(&engine),
        "/api/generate",
        json!({"prompt": "hi", "raw": true, "system": "be terse", "stream": false}),
    )
    .await;

    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        res.json()["error"],
        "raw mode does not support template, system, or context"
    );
    assert_eq!(engine.calls(), 0);
}

#[tokio::test]
async fn generate_unload_skips_engine() {
    let engine = stub();
    let res = post_json(
        router(&engine),
        "/api/generate",
        json!({"model": MODEL_NAME, "prompt": "", "keep_alive": 0}),
    )
    .await;

    assert_eq!(res.status, StatusCode::OK);
    let body = res.json();
    assert_eq!(body["done"], true);
    assert_eq!(body["done_reason"], "unload");
    assert_eq!(body["response"], "Not currently supported");
    assert_eq!(engine.calls(), 0);
}

#[tokio::test]
async fn generate_empty_prompt_reports_load() {
    let engine = stub();
    let res = post_json(router(&engine), "/api/generate", json!({"prompt": ""})).await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["done_reason"], "load");
    assert_eq!(engine.calls(), 0);
}

#[tokio::test]
async fn generate_unknown_model_is_404() {
    let engine = stub();
    let res = post_json(
        router(&engine),
        "/api/generate",
        json!({"model": "x", "prompt": "hi", "stream": false}),
    )
    .await;

    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.json()["error"], "model 'x' not found");
    assert_eq!(engine.calls(), 0);
}

#[tokio::test]
async fn generate_accepts_latest_tag_and_file_name() {
    let engine = stub();
    for model in ["tiny-llama:latest", "tiny-llama.gguf", "/models/tiny-llama.gguf"] {
        let res = post_json(
            router(&engine),
            "/api/generate",
            json!({"model": model, "prompt": "hi", "stream": false}),
        )
        .await;
        assert_eq!(res.status, StatusCode::OK, "{model}");
    }
}

#[tokio::test]
async fn generate_suffix_fills_in_the_middle() {
    let engine = stub();
    let res = post_json(
        router(&engine),
        "/api/generate",
        json!({
            "prompt": "def add(a, b):",
            "suffix": "return c",
            "template": "<PRE> {{ prompt }} <SUF>{{ suffix }} <MID>",
            "stream": false
        }),
    )
    .await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(
        engine.last_prompt().as_deref(),
        Some("<PRE> def add(a, b): <SUF>return c <MID>")
    );
}

#[tokio::test]
async fn generate_broken_template_is_500() {
    let engine = stub();
    let res = post_json(
        router(&engine),
        "/api/generate",
        json!({"prompt": "hi", "template": "{% for %}", "stream": false}),
    )
    .await;

    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(res.json()["error"].is_string());
    assert_eq!(engine.calls(), 0);
}

#[tokio::test]
async fn generate_malformed_body_is_400() {
    let res = post_json(router(&stub()), "/api/generate", json!({"prompt": 7})).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert!(res.json()["error"].is_string());
}

#[tokio::test]
async fn generate_while_loading_is_503_with_retry_after() {
    let engine = stub();
    let res = post_json(
        loading_router(&engine),
        "/api/generate",
        json!({"prompt": "hi", "stream": false}),
    )
    .await;

    assert_eq!(res.status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(res.headers.contains_key(header::RETRY_AFTER));
    assert_eq!(res.json()["error"], "model is loading, try again");
    assert_eq!(engine.calls(), 0);
}

#[tokio::test]
async fn generate_engine_failure_is_500() {
    let engine = Arc::new(StubEngine::new().with_failure("decode failed"));
    let res = post_json(
        router(&engine),
        "/api/generate",
        json!({"prompt": "hi", "stream": false}),
    )
    .await;

    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.json()["error"], "decode failed");
}

// ── /api/chat ──────────────────────────────────────────────────────────

#[tokio::test]
async fn chat_returns_assistant_message() {
    let engine = stub();
    let res = post_json(
        router(&engine),
        "/api/chat",
        json!({
            "model": MODEL_NAME,
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "why is the sky blue?"}
            ],
            "stream": false
        }),
    )
    .await;

    assert_eq!(res.status, StatusCode::OK);
    let body = res.json();
    assert_eq!(body["message"]["role"], "assistant");
    assert_eq!(body["message"]["content"], "Rayleigh scattering.");
    assert_eq!(engine.last_messages().len(), 2);
}

#[tokio::test]
async fn chat_unload_and_load_shortcuts() {
    let engine = stub();
    let unload = post_json(
        router(&engine),
        "/api/chat",
        json!({"messages": [], "keep_alive": "0s"}),
    )
    .await;
    assert_eq!(unload.json()["done_reason"], "unload");
    assert_eq!(unload.json()["message"]["content"], "Not currently supported");

    let load = post_json(router(&engine), "/api/chat", json!({"messages": []})).await;
    assert_eq!(load.json()["done_reason"], "load");
    assert_eq!(load.json()["message"]["role"], "assistant");

    assert_eq!(engine.calls(), 0);
}

// ── /api/embed, /api/embeddings ────────────────────────────────────────

#[tokio::test]
async fn embed_single_string() {
    let engine = stub();
    let res = post_json(
        router(&engine),
        "/api/embed",
        json!({"model": MODEL_NAME, "input": "hello"}),
    )
    .await;

    assert_eq!(res.status, StatusCode::OK);
    let body = res.json();
    assert_eq!(body["embeddings"].as_array().unwrap().len(), 1);
    assert_eq!(body["prompt_eval_count"], 1);
}

#[tokio::test]
async fn embed_list_is_joined_with_separator() {
    let engine = stub();
    let res = post_json(router(&engine), "/api/embed", json!({"input": ["a", "b"]})).await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(engine.last_prompt().as_deref(), Some("a\nb"));
    let embeddings = res.json()["embeddings"].clone();
    assert_eq!(embeddings.as_array().unwrap().len(), 2);
    assert_eq!(res.json()["prompt_eval_count"], 2);
}

#[tokio::test]
async fn embed_count_mismatch_is_500() {
    let engine = Arc::new(StubEngine::new().with_embedding("[[1.0]]"));
    let res = post_json(router(&engine), "/api/embed", json!({"input": ["a", "b"]})).await;

    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.json()["error"], "1 != 2");
}

#[tokio::test]
async fn embed_empty_input_returns_no_embeddings() {
    let engine = stub();
    for input in [json!(""), json!([])] {
        let res = post_json(router(&engine), "/api/embed", json!({"input": input})).await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.json()["embeddings"], json!([]));
    }
    assert_eq!(engine.calls(), 0);
}

#[tokio::test]
async fn embed_rejects_non_string_input() {
    let engine = stub();
    for input in [json!(42), json!(["a", 1])] {
        let res = post_json(router(&engine), "/api/embed", json!({"input": input})).await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        assert_eq!(res.json()["error"], "invalid input type");
    }
}

#[tokio::test]
async fn legacy_embeddings_returns_first_vector() {
    let engine = stub();
    let res = post_json(router(&engine), "/api/embeddings", json!({"prompt": "hey"})).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["embedding"], json!([3.0, 1.0]));

    let empty = post_json(router(&engine), "/api/embeddings", json!({"prompt": ""})).await;
    assert_eq!(empty.json()["embedding"], json!([]));
}

// ── /api/show ──────────────────────────────────────────────────────────

#[tokio::test]
async fn show_requires_a_model_then_is_unsupported() {
    let engine = stub();
    let res = post_json(router(&engine), "/api/show", json!({})).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.json()["error"], "model is required");

    let res = post_json(router(&engine), "/api/show", json!({"name": MODEL_NAME})).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.json()["error"], "No support");
}

// ── OpenAI ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn openai_chat_completion() {
    let res = post_json(
        router(&stub()),
        "/v1/chat/completions",
        json!({"model": MODEL_NAME, "messages": [{"role": "user", "content": "hi"}]}),
    )
    .await;

    assert_eq!(res.status, StatusCode::OK);
    let body = res.json();
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["choices"][0]["message"]["content"], "Rayleigh scattering.");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
}

#[tokio::test]
async fn openai_chat_stream_is_sse_with_done() {
    let res = post_json(
        router(&stub()),
        "/v1/chat/completions",
        json!({"messages": [{"role": "user", "content": "hi"}], "stream": true}),
    )
    .await;

    assert_eq!(res.status, StatusCode::OK);
    assert!(
        res.headers[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );
    let text = res.text();
    assert!(text.contains("chat.completion.chunk"));
    assert!(text.trim_end().ends_with("data: [DONE]"));
}

#[tokio::test]
async fn openai_completion() {
    let engine = stub();
    let res = post_json(
        router(&engine),
        "/v1/completions",
        json!({"model": MODEL_NAME, "prompt": "Once upon"}),
    )
    .await;

    assert_eq!(res.status, StatusCode::OK);
    let body = res.json();
    assert_eq!(body["object"], "text_completion");
    assert_eq!(body["choices"][0]["text"], "Rayleigh scattering.");
}

#[tokio::test]
async fn openai_embeddings() {
    let res = post_json(
        router(&stub()),
        "/v1/embeddings",
        json!({"model": MODEL_NAME, "input": ["x", "yy"]}),
    )
    .await;

    assert_eq!(res.status, StatusCode::OK);
    let body = res.json();
    assert_eq!(body["object"], "list");
    assert_eq!(body["data"][1]["index"], 1);
    assert_eq!(body["data"][1]["embedding"], json!([2.0, 1.0]));
}

#[tokio::test]
async fn openai_unknown_model_is_404() {
    let res = post_json(
        router(&stub()),
        "/v1/chat/completions",
        json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hi"}]}),
    )
    .await;

    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.json()["error"], "model 'gpt-4o' not found");
}

#[tokio::test]
async fn openai_models_list_is_empty() {
    let res = get(router(&stub()), "/v1/models").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json(), json!({"object": "list", "data": []}));
}

#[tokio::test]
async fn openai_model_detail_is_unsupported() {
    let engine = stub();
    let res = post_json(router(&engine), "/v1/models/unknown", json!({})).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.json(), json!({"error": "No support"}));

    let res = get(router(&engine), "/v1/models/tiny-llama").await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}
