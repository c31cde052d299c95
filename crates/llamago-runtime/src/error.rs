//! Errors raised while running an execution mode.

use std::time::Duration;

use thiserror::Error;

use llamago_core::{ConfigError, EngineError};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("engine not ready after {}s", .0.as_secs())]
    ReadinessTimeout(Duration),

    #[error("engine failed to start: {0}")]
    EngineFailed(String),

    #[error("interrupted before the engine was ready")]
    Interrupted,

    #[error("No prompt")]
    EmptyPrompt,

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}
