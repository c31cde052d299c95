//! Command-line flags and their mapping onto [`Config`].
//!
//! Every flag can also come from the environment (`LLAMAGO_*`), and a
//! `.env` file in the working directory is loaded before parsing.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use llamago_core::{
    Config, DEFAULT_GATEWAY_ADDR, DEFAULT_HOST, DEFAULT_RPC_ENDPOINT, EmbeddingFormat, Pooling,
};

use crate::commands::Commands;

/// Front a local llama.cpp engine with Ollama, OpenAI and gRPC APIs.
///
/// With `--interactive` the engine's REPL runs in the foreground. With
/// `--prompt` one completion is generated and printed. Otherwise the APIs
/// are served until Ctrl-C.
#[derive(Debug, Parser)]
#[command(name = "llamago")]
#[command(version, about)]
pub struct Cli {
    /// Logging level (RUST_LOG overrides it)
    #[arg(
        short = 'l',
        long = "log-level",
        env = "LLAMAGO_LOG_LEVEL",
        default_value = "info",
        value_parser = ["trace", "debug", "info", "warn", "error"],
        global = true
    )]
    pub log_level: String,

    /// Path to the model file
    #[arg(short = 'm', long, env = "LLAMAGO_MODEL", global = true)]
    pub model: Option<String>,

    /// Size of the prompt context
    #[arg(short = 'c', long = "ctx-size", default_value_t = 4096, global = true)]
    pub ctx_size: u32,

    /// Prompt for one-shot generation or embedding
    #[arg(short = 'p', long, global = true)]
    pub prompt: Option<String>,

    /// Layers to offload to the GPU (-1 lets the engine decide)
    #[arg(
        long = "n-gpu-layers",
        alias = "ngl",
        default_value_t = -1,
        allow_negative_numbers = true,
        global = true
    )]
    pub n_gpu_layers: i32,

    /// Tokens to predict per generation (-1 = until a stop token)
    #[arg(
        short = 'n',
        long = "n-predict",
        default_value_t = 512,
        allow_negative_numbers = true,
        global = true
    )]
    pub n_predict: i32,

    /// Run the engine's interactive REPL
    #[arg(short = 'i', long, global = true)]
    pub interactive: bool,

    /// RNG seed (4294967295 = random)
    #[arg(short = 's', long, default_value_t = u32::MAX, global = true)]
    pub seed: u32,

    /// Pooling type for embeddings {none, mean, cls, last, rank}
    #[arg(short = 'o', long, default_value = "mean", global = true)]
    pub pooling: Pooling,

    /// Embedding normalization (-1 none, 0 max abs int16, 1 taxicab, 2 euclidean, >2 p-norm)
    #[arg(
        short = 'N',
        long = "embd-normalize",
        default_value_t = 2,
        allow_negative_numbers = true,
        global = true
    )]
    pub embd_normalize: i32,

    /// Embedding output: "" plain text, "array", "json" or "json+" (adds cosine similarity)
    #[arg(long = "embd-output-format", default_value = "json", global = true)]
    pub embd_output_format: EmbeddingFormat,

    /// Separator between embedding prompts
    #[arg(long = "embd-separator", default_value = "\n", global = true)]
    pub embd_separator: String,

    /// Logical maximum batch size
    #[arg(short = 'b', long = "batch-size", default_value_t = 2048, global = true)]
    pub batch_size: u32,

    /// Physical maximum batch size
    #[arg(long = "ubatch-size", alias = "ub", default_value_t = 512, global = true)]
    pub ubatch_size: u32,

    /// Write one-shot or embedding output here instead of stdout
    #[arg(long = "output-file", alias = "of", global = true)]
    pub output_file: Option<PathBuf>,

    /// Address for the HTTP API
    #[arg(long, alias = "ho", env = "LLAMAGO_HOST", default_value = DEFAULT_HOST, global = true)]
    pub host: String,

    /// Comma-separated list of extra allowed CORS origins
    #[arg(long, alias = "or", env = "LLAMAGO_ORIGINS", default_value = "", global = true)]
    pub origins: String,

    /// Address for the gRPC listener
    #[arg(long = "rpc-endpoint", env = "LLAMAGO_RPC_ENDPOINT", default_value = DEFAULT_RPC_ENDPOINT, global = true)]
    pub rpc_endpoint: String,

    /// Address for the HTTP+JSON gateway in front of the gRPC listener
    #[arg(long = "gateway", env = "LLAMAGO_GATEWAY", default_value = DEFAULT_GATEWAY_ADDR, global = true)]
    pub gateway_addr: String,

    /// Serve only the HTTP API
    #[arg(long = "no-rpc", global = true)]
    pub no_rpc: bool,

    /// llama-server binary
    #[arg(long = "llama-server", env = "LLAMAGO_LLAMA_SERVER", default_value = "llama-server", global = true)]
    pub llama_server: PathBuf,

    /// llama-cli binary, used for interactive mode
    #[arg(long = "llama-cli", env = "LLAMAGO_LLAMA_CLI", default_value = "llama-cli", global = true)]
    pub llama_cli: PathBuf,

    /// Port for the llama-server child (0 picks a free one)
    #[arg(long = "engine-port", env = "LLAMAGO_ENGINE_PORT", default_value_t = 0, global = true)]
    pub engine_port: u16,

    /// Seconds to wait for the model to load
    #[arg(long = "startup-timeout", default_value_t = 120, global = true)]
    pub startup_timeout: u64,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// The immutable run configuration these flags describe.
    pub fn to_config(&self) -> Config {
        Config {
            log_level: self.log_level.clone(),
            model: self.model.clone().unwrap_or_default(),
            ctx_size: self.ctx_size,
            prompt: self.prompt.clone().unwrap_or_default(),
            n_gpu_layers: self.n_gpu_layers,
            n_predict: self.n_predict,
            interactive: self.interactive,
            seed: self.seed,
            pooling: self.pooling,
            embd_normalize: self.embd_normalize,
            embd_output_format: self.embd_output_format,
            embd_separator: self.embd_separator.clone(),
            batch_size: self.batch_size,
            ubatch_size: self.ubatch_size,
            output_file: self.output_file.clone(),
            host: self.host.clone(),
            origins: self.origins.clone(),
            rpc_endpoint: self.rpc_endpoint.clone(),
            gateway_addr: self.gateway_addr.clone(),
            enable_rpc: !self.no_rpc,
            llama_server_path: self.llama_server.clone(),
            llama_cli_path: self.llama_cli.clone(),
            engine_port: self.engine_port,
            startup_timeout: Duration::from_secs(self.startup_timeout),
        }
    }
}
