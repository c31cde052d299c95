//! Shared helpers for llamago-server integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use llamago_core::testing::StubEngine;
use llamago_core::{Config, Engine, EngineGate, EngineState};
use llamago_server::{ApiState, create_router};
use tokio::sync::watch;
use tower::ServiceExt;

/// Model configured for every test router.
pub const MODEL_PATH: &str = "/models/tiny-llama.gguf";
pub const MODEL_NAME: &str = "tiny-llama";

pub fn test_config() -> Config {
    Config {
        model: MODEL_PATH.to_string(),
        ..Config::default()
    }
}

/// Router over a ready stub engine.
pub fn router(engine: &Arc<StubEngine>) -> Router {
    router_with_gate(StubEngine::ready_gate(Arc::clone(engine)))
}

/// Router whose engine is still loading the model.
pub fn loading_router(engine: &Arc<StubEngine>) -> Router {
    let engine: Arc<dyn Engine> = engine.clone();
    let (tx, rx) = watch::channel(EngineState::Loading);
    // the receiver keeps the last value after the sender is gone
    drop(tx);
    router_with_gate(EngineGate::new(engine, rx))
}

pub fn router_with_gate(gate: EngineGate) -> Router {
    let state = ApiState::new(Arc::new(test_config()), gate).expect("default template");
    create_router(state, None)
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("response body is JSON")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub async fn send(app: Router, request: Request<Body>) -> TestResponse {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    TestResponse {
        status,
        headers,
        body: body.to_vec(),
    }
}

pub async fn get(app: Router, uri: &str) -> TestResponse {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> TestResponse {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}
