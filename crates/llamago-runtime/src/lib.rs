//! Engine process adapter and run coordination for llamago.
//!
//! [`LlamaServerEngine`] implements the [`llamago_core::Engine`] port on top
//! of llama.cpp binaries. [`Lifecycle`] starts that engine in the
//! background, owns the listener tasks and shuts everything down in order.
//! [`App`] picks the execution mode and wires the API crates together.

pub mod app;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod llama;
pub mod shutdown;
pub mod signal;

pub use app::App;
pub use error::LifecycleError;
pub use lifecycle::Lifecycle;
pub use llama::{LlamaCommandBuilder, LlamaServerEngine};
pub use signal::shutdown_signal;

#[cfg(test)]
use {tempfile as _, tokio_test as _};
