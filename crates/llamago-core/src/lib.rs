//! Core domain types for llamago.
//!
//! This crate owns everything that does not touch the network or a child
//! process: the immutable run [`Config`], the pure [`select_mode`] decision,
//! the [`Engine`] port that concrete inference backends implement, and the
//! [`EngineGate`] that serializes calls into that port.

pub mod config;
pub mod embedding;
pub mod engine;
pub mod gate;
pub mod mode;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use config::{
    Config, ConfigError, DEFAULT_GATEWAY_ADDR, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_RPC_ENDPOINT,
    HostUrl, Pooling,
};
pub use embedding::{EmbedInput, EmbeddingError, EmbeddingFormat};
pub use engine::{ChatMessage, Engine, EngineConfig, EngineError, EngineState};
pub use gate::EngineGate;
pub use mode::{ExecutionMode, select_mode};

// Silence unused dev-dependency warnings for crates only some tests use
#[cfg(test)]
use tokio_test as _;
