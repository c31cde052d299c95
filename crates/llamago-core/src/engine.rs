//! Engine port.
//!
//! The [`Engine`] trait is the boundary to the external inference backend.
//! Everything above it (lifecycle, HTTP and RPC translators) talks to the
//! backend only through this trait, which keeps process management and
//! protocol details out of the API layer.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Pooling;
use crate::embedding::EmbeddingFormat;

/// A single chat turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Typed start parameters handed to [`Engine::start`].
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub model_path: PathBuf,
    pub ctx_size: u32,
    pub n_gpu_layers: i32,
    pub n_predict: i32,
    pub seed: u32,
    pub batch_size: u32,
    pub ubatch_size: u32,
    pub pooling: Pooling,
    pub embd_normalize: i32,
    pub embd_separator: String,
    /// Initial prompt, used by the interactive REPL.
    pub prompt: String,
}

/// Readiness of the engine, published by the lifecycle coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EngineState {
    #[default]
    Stopped,
    Loading,
    Ready,
    Failed(String),
}

impl EngineState {
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Errors that can occur during engine operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The engine is still loading (or was never started).
    /// Callers should return 503 Service Unavailable.
    #[error("model is loading, try again")]
    NotReady,

    /// The engine failed to start and will not become ready.
    #[error("model failed to load: {0}")]
    StartupFailed(String),

    #[error("failed to start engine: {0}")]
    Start(String),

    #[error("failed to stop engine: {0}")]
    Stop(String),

    #[error("{0}")]
    Generation(String),

    #[error("{0}")]
    Embedding(String),

    #[error("interactive session failed: {0}")]
    Interactive(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Returns true if this error indicates a temporary condition
    /// where retrying may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::NotReady)
    }

    /// Returns a suggested HTTP status code for this error.
    pub const fn suggested_status_code(&self) -> u16 {
        match self {
            Self::NotReady | Self::StartupFailed(_) => 503,
            Self::Start(_)
            | Self::Stop(_)
            | Self::Generation(_)
            | Self::Embedding(_)
            | Self::Interactive(_)
            | Self::Internal(_) => 500,
        }
    }
}

/// Port for the external inference engine.
///
/// At most one engine session is live per process. Implementations are not
/// assumed to be reentrant: callers go through [`crate::EngineGate`], which
/// allows a single generate, chat or embed call in flight at a time.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Engine: Send + Sync + fmt::Debug {
    /// Load the model and prepare a session. May take a long time.
    ///
    /// Starting while a session is live replaces it.
    async fn start(&self, config: &EngineConfig) -> Result<(), EngineError>;

    /// Release the session. Safe to call when `start` failed or never ran.
    async fn stop(&self) -> Result<(), EngineError>;

    /// Single-shot completion of an already rendered prompt.
    async fn generate(&self, prompt: &str) -> Result<String, EngineError>;

    /// Chat completion over ordered messages.
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, EngineError>;

    /// Embed separator-joined prompts, returning the rendered output.
    ///
    /// With [`EmbeddingFormat::Array`] the output is a JSON array holding one
    /// float vector per joined segment.
    async fn embed(&self, prompts: &str, format: EmbeddingFormat) -> Result<String, EngineError>;

    /// Run the interactive REPL in the foreground until the user exits.
    async fn interactive(&self, config: &EngineConfig) -> Result<(), EngineError>;
}
