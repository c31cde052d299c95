//! Command-line front end for llamago.

pub mod commands;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod parser;

pub use commands::Commands;
pub use error::CliError;
pub use parser::Cli;

// Used by the binary only
use dotenvy as _;

#[cfg(test)]
use {tempfile as _, tokio_test as _};
