//! `llamago embedding`: embed the prompt once and print the result.

use llamago_core::Config;
use llamago_runtime::{App, shutdown_signal};

use crate::error::CliError;

pub async fn execute(config: Config) -> Result<(), CliError> {
    App::llama(config).embedding(shutdown_signal()).await?;
    Ok(())
}
