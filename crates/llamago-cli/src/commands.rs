//! Subcommands.

use clap::Subcommand;

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Generate high-dimensional embedding vectors of the prompt
    #[command(alias = "e")]
    Embedding,
}
