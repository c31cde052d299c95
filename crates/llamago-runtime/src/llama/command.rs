//! Argument building for llama.cpp binaries.

use std::path::PathBuf;
use std::process::Command;

use llamago_core::EngineConfig;

/// Builder for `llama-server` and `llama-cli` invocations.
///
/// Model path, context size and GPU layers are always emitted first; any
/// further flags follow in the order they were added.
///
/// ```rust,ignore
/// let cmd = LlamaCommandBuilder::new("llama-server", "/models/tiny.gguf")
///     .context_size(4096)
///     .arg_with_value("--port", "8080")
///     .flag("--embeddings")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct LlamaCommandBuilder {
    binary_path: PathBuf,
    model_path: PathBuf,
    context_size: Option<u32>,
    gpu_layers: Option<i32>,
    additional_args: Vec<(String, Option<String>)>,
}

impl LlamaCommandBuilder {
    pub fn new(binary_path: impl Into<PathBuf>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
            model_path: model_path.into(),
            context_size: None,
            gpu_layers: None,
            additional_args: Vec::new(),
        }
    }

    /// Start from the shared engine settings: `-c`, `-ngl`, `-n` and `--seed`.
    pub fn from_engine_config(binary_path: impl Into<PathBuf>, config: &EngineConfig) -> Self {
        Self::new(binary_path, &config.model_path)
            .context_size(config.ctx_size)
            .gpu_layers(config.n_gpu_layers)
            .arg_with_value("-n", config.n_predict.to_string())
            .arg_with_value("--seed", config.seed.to_string())
    }

    #[must_use]
    pub const fn context_size(mut self, size: u32) -> Self {
        self.context_size = Some(size);
        self
    }

    #[must_use]
    pub const fn gpu_layers(mut self, layers: i32) -> Self {
        self.gpu_layers = Some(layers);
        self
    }

    /// Add a flag with an optional value.
    #[must_use]
    pub fn arg(mut self, key: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        self.additional_args.push((key.into(), value.map(Into::into)));
        self
    }

    #[must_use]
    pub fn arg_with_value(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.arg(key, Some(value))
    }

    /// Add a flag that takes no value.
    #[must_use]
    pub fn flag(self, key: impl Into<String>) -> Self {
        self.arg(key, None::<String>)
    }

    /// Arguments in the order [`build`](Self::build) passes them.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["-m".to_string(), self.model_path.display().to_string()];
        if let Some(size) = self.context_size {
            args.extend(["-c".to_string(), size.to_string()]);
        }
        if let Some(layers) = self.gpu_layers {
            args.extend(["-ngl".to_string(), layers.to_string()]);
        }
        for (key, value) in &self.additional_args {
            args.push(key.clone());
            if let Some(value) = value {
                args.push(value.clone());
            }
        }
        args
    }

    pub fn build(self) -> Command {
        let mut cmd = Command::new(&self.binary_path);
        cmd.args(self.args());
        cmd
    }
}
