//! llama.cpp backend.

mod command;
pub mod embedding;
mod server;

pub use command::LlamaCommandBuilder;
pub use server::LlamaServerEngine;
