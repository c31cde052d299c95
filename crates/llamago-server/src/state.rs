//! Shared handler state.

use std::sync::Arc;

use llamago_core::{Config, EngineGate};

use crate::error::ApiError;
use crate::template::{DEFAULT_TEMPLATE, PromptTemplate};

/// Shared API state, cloned into every handler via Axum `State`.
///
/// Used by both the Ollama (`/api/`) and OpenAI (`/v1/`) route trees.
#[derive(Debug, Clone)]
pub struct ApiState {
    pub(crate) config: Arc<Config>,
    pub(crate) gate: EngineGate,
    pub(crate) template: Arc<PromptTemplate>,
}

impl ApiState {
    /// Build state with the default ChatML prompt template.
    pub fn new(config: Arc<Config>, gate: EngineGate) -> Result<Self, minijinja::Error> {
        Ok(Self {
            config,
            gate,
            template: Arc::new(PromptTemplate::new(DEFAULT_TEMPLATE)?),
        })
    }

    /// Reject a request that names a model other than the configured one.
    pub(crate) fn check_model(&self, requested: &str) -> Result<(), ApiError> {
        if requested.is_empty() || self.config.matches_model(requested) {
            Ok(())
        } else {
            Err(ApiError::model_not_found(requested))
        }
    }

    /// Model name echoed back in responses when the request gave none.
    pub(crate) fn response_model(&self, requested: &str) -> String {
        if requested.is_empty() {
            self.config.model_name().to_string()
        } else {
            requested.to_string()
        }
    }
}
