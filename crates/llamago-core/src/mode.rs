//! Execution mode selection.

use std::fmt;

use crate::config::Config;

/// How a run uses the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionMode {
    /// Foreground REPL owned by the engine.
    Interactive,
    /// Generate once from the configured prompt, then exit.
    OneShot,
    /// Serve the HTTP and RPC APIs until interrupted.
    Server,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Interactive => "interactive",
            Self::OneShot => "one-shot",
            Self::Server => "server",
        };
        f.write_str(name)
    }
}

/// Pick the execution mode for a configuration.
///
/// Interactive wins over a prompt; with neither, the process serves.
pub fn select_mode(cfg: &Config) -> ExecutionMode {
    if cfg.interactive {
        ExecutionMode::Interactive
    } else if !cfg.prompt.is_empty() {
        ExecutionMode::OneShot
    } else {
        ExecutionMode::Server
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(interactive: bool, prompt: &str) -> Config {
        Config {
            model: "m.gguf".to_string(),
            interactive,
            prompt: prompt.to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn interactive_takes_priority() {
        assert_eq!(select_mode(&cfg(true, "")), ExecutionMode::Interactive);
        assert_eq!(select_mode(&cfg(true, "hi")), ExecutionMode::Interactive);
    }

    #[test]
    fn prompt_selects_one_shot() {
        assert_eq!(select_mode(&cfg(false, "hi")), ExecutionMode::OneShot);
    }

    #[test]
    fn otherwise_server() {
        assert_eq!(select_mode(&cfg(false, "")), ExecutionMode::Server);
        assert_eq!(select_mode(&Config::default()), ExecutionMode::Server);
    }

    #[test]
    fn selection_is_pure() {
        let config = cfg(false, "hi");
        let before = config.clone();
        let first = select_mode(&config);
        for _ in 0..10 {
            assert_eq!(select_mode(&config), first);
        }
        assert_eq!(config, before);
    }

    #[test]
    fn mode_agrees_with_lonely_flag() {
        for (interactive, prompt) in [(false, ""), (false, "p"), (true, ""), (true, "p")] {
            let config = cfg(interactive, prompt);
            let lonely = select_mode(&config) != ExecutionMode::Server;
            assert_eq!(lonely, config.is_lonely());
        }
    }
}
