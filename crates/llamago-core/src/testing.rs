//! Test doubles for the engine port.
//!
//! Enabled for this crate's own tests and, through the `test-utils` feature,
//! for the other workspace crates' tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::embedding::EmbeddingFormat;
use crate::engine::{ChatMessage, Engine, EngineConfig, EngineError, EngineState};
use crate::gate::EngineGate;

/// Call-counting engine with canned replies.
///
/// `generate` and `chat` return the configured reply. `embed` returns the
/// configured raw output, or one small vector per separator-delimited
/// segment when none is set.
#[derive(Debug)]
pub struct StubEngine {
    reply: String,
    embedding: Option<String>,
    failure: Option<String>,
    start_failure: Option<String>,
    separator: String,
    delay: Duration,
    calls: AtomicUsize,
    completed: AtomicUsize,
    starts: AtomicUsize,
    stops: AtomicUsize,
    live: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
    last_messages: Mutex<Vec<ChatMessage>>,
}

impl Default for StubEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StubEngine {
    pub fn new() -> Self {
        Self {
            reply: "stub reply".to_string(),
            embedding: None,
            failure: None,
            start_failure: None,
            separator: "\n".to_string(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            live: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
            last_messages: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = reply.into();
        self
    }

    /// Raw output returned verbatim by `embed`.
    #[must_use]
    pub fn with_embedding(mut self, raw: impl Into<String>) -> Self {
        self.embedding = Some(raw.into());
        self
    }

    /// Make every generate, chat and embed call fail with this message.
    #[must_use]
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Make `start` fail with this message.
    #[must_use]
    pub fn with_start_failure(mut self, message: impl Into<String>) -> Self {
        self.start_failure = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Hold every engine call for this long.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// A gate over `engine` that reports ready immediately.
    pub fn ready_gate(engine: Arc<Self>) -> EngineGate {
        let (_tx, rx) = watch::channel(EngineState::Ready);
        EngineGate::new(engine, rx)
    }

    pub fn reply(&self) -> String {
        self.reply.clone()
    }

    /// Generate, chat and embed calls that reached the engine.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls that ran to the end of their delay.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn start_calls(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Whether a started session has not been stopped yet.
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed in flight at once.
    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Prompt passed to the most recent generate or embed call.
    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_messages(&self) -> Vec<ChatMessage> {
        self.last_messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn enter(&self, prompt: Option<&str>) -> Result<(), EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(prompt) = prompt {
            *self
                .last_prompt
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(prompt.to_string());
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);

        match &self.failure {
            Some(message) => Err(EngineError::Generation(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Engine for StubEngine {
    async fn start(&self, _config: &EngineConfig) -> Result<(), EngineError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(message) = &self.start_failure {
            return Err(EngineError::Start(message.clone()));
        }
        self.live.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), EngineError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.live.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn generate(&self, prompt: &str) -> Result<String, EngineError> {
        self.enter(Some(prompt)).await?;
        Ok(self.reply.clone())
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, EngineError> {
        *self
            .last_messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = messages.to_vec();
        self.enter(None).await?;
        Ok(self.reply.clone())
    }

    async fn embed(&self, prompts: &str, format: EmbeddingFormat) -> Result<String, EngineError> {
        self.enter(Some(prompts))
            .await
            .map_err(|e| EngineError::Embedding(e.to_string()))?;
        if let Some(raw) = &self.embedding {
            return Ok(raw.clone());
        }
        let vectors: Vec<Vec<f32>> = prompts
            .split(self.separator.as_str())
            .map(|segment| vec![segment.len() as f32, 1.0])
            .collect();
        match format {
            EmbeddingFormat::Array => serde_json::to_string(&vectors)
                .map_err(|e| EngineError::Embedding(e.to_string())),
            other => Ok(format!("{other}:{}", vectors.len())),
        }
    }

    async fn interactive(&self, _config: &EngineConfig) -> Result<(), EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
