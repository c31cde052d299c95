//! `llamago` binary.

use clap::Parser;
use tracing::error;

use llamago_cli::{Cli, CliError, Commands, handlers, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env first so its values feed the env-backed flags
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    logging::init(&cli.log_level)?;

    if let Err(e) = dispatch(&cli).await {
        error!(error = %e, "llamago failed");
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
    Ok(())
}

async fn dispatch(cli: &Cli) -> Result<(), CliError> {
    let config = cli.to_config();
    match cli.command {
        Some(Commands::Embedding) => handlers::embedding::execute(config).await,
        None => handlers::run::execute(config).await,
    }
}
