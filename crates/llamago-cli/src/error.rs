//! CLI error type and exit codes.

use thiserror::Error;

use llamago_core::EngineError;
use llamago_runtime::LifecycleError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Core(String),

    #[error("Invalid arguments: {0}")]
    Arguments(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The engine process failed to start or to answer.
    #[error("Process error: {0}")]
    Process(String),
}

impl CliError {
    /// Exit code, following sysexits.h where a category fits.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Core(_) => 1,
            Self::Arguments(_) => 2, // EX_USAGE
            Self::Process(_) => 71,  // EX_OSERR
            Self::Io(_) => 74,       // EX_IOERR
            Self::Config(_) => 78,   // EX_CONFIG
        }
    }
}

impl From<LifecycleError> for CliError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Config(e) => Self::Config(e.to_string()),
            LifecycleError::EmptyPrompt => Self::Arguments(err.to_string()),
            LifecycleError::Output(e) => Self::Io(e.to_string()),
            LifecycleError::Engine(EngineError::Interactive(msg)) => Self::Process(msg),
            LifecycleError::ReadinessTimeout(_)
            | LifecycleError::EngineFailed(_)
            | LifecycleError::Engine(_) => Self::Process(err.to_string()),
            LifecycleError::Interrupted => Self::Core(err.to_string()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llamago_core::ConfigError;
    use std::time::Duration;

    #[test]
    fn lifecycle_errors_map_to_exit_codes() {
        let missing: CliError = LifecycleError::Config(ConfigError::MissingModel).into();
        assert_eq!(missing.exit_code(), 78);
        assert_eq!(missing.to_string(), "Configuration error: No config model");

        let timeout: CliError = LifecycleError::ReadinessTimeout(Duration::from_secs(3)).into();
        assert_eq!(timeout.exit_code(), 71);

        let prompt: CliError = LifecycleError::EmptyPrompt.into();
        assert_eq!(prompt.exit_code(), 2);

        let io: CliError = LifecycleError::Output(std::io::Error::other("disk full")).into();
        assert_eq!(io.exit_code(), 74);

        assert_eq!(CliError::from(LifecycleError::Interrupted).exit_code(), 1);
    }
}
