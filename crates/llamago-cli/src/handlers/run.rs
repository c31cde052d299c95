//! Default command: interactive, one-shot or server, picked from the flags.

use tracing::debug;

use llamago_core::Config;
use llamago_runtime::App;

use crate::error::CliError;

pub async fn execute(config: Config) -> Result<(), CliError> {
    let app = App::llama(config);
    debug!(mode = %app.mode(), "dispatching");
    app.run().await?;
    Ok(())
}
