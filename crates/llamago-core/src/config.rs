//! Run configuration.
//!
//! A [`Config`] is built once at process start (from flags and environment)
//! and is read-only afterwards. It is shared between components as an
//! `Arc<Config>`; nothing in the process mutates it after construction.

use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::embedding::EmbeddingFormat;
use crate::engine::EngineConfig;

/// Default bind address for the HTTP API.
pub const DEFAULT_HOST: &str = "127.0.0.1:8081";

/// Port used when the configured host carries no usable port.
pub const DEFAULT_PORT: u16 = 8081;

/// Default address of the RPC listener.
pub const DEFAULT_RPC_ENDPOINT: &str = "127.0.0.1:50051";

/// Default bind address for the HTTP+JSON gateway in front of the RPC listener.
pub const DEFAULT_GATEWAY_ADDR: &str = "127.0.0.1:8082";

const LOCAL_HOSTS: [&str; 3] = ["localhost", "127.0.0.1", "0.0.0.0"];

const DESKTOP_ORIGINS: [&str; 5] = [
    "app://*",
    "file://*",
    "tauri://*",
    "vscode-webview://*",
    "vscode-file://*",
];

/// Errors raised while validating a configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// No model path was supplied.
    #[error("No config model")]
    MissingModel,

    /// A numeric field is outside the range the engine accepts.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Embedding pooling strategy forwarded to the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pooling {
    None,
    #[default]
    Mean,
    Cls,
    Last,
    Rank,
}

impl Pooling {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Mean => "mean",
            Self::Cls => "cls",
            Self::Last => "last",
            Self::Rank => "rank",
        }
    }
}

impl fmt::Display for Pooling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Pooling {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "mean" => Ok(Self::Mean),
            "cls" => Ok(Self::Cls),
            "last" => Ok(Self::Last),
            "rank" => Ok(Self::Rank),
            other => Err(format!(
                "unknown pooling type '{other}' (expected none, mean, cls, last or rank)"
            )),
        }
    }
}

/// Resolved listen address for the HTTP API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostUrl {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl HostUrl {
    /// `host:port` suitable for binding, with IPv6 hosts bracketed.
    pub fn authority(&self) -> String {
        join_host_port(&self.host, &self.port.to_string())
    }
}

impl fmt::Display for HostUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority())?;
        if !self.path.is_empty() {
            write!(f, "/{}", self.path)?;
        }
        Ok(())
    }
}

/// Immutable snapshot of run parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Default log directive (`trace`, `debug`, `info`, `warn`, `error`).
    pub log_level: String,
    /// Path to the model file.
    pub model: String,
    /// Prompt context size.
    pub ctx_size: u32,
    /// Prompt for one-shot generation or embedding.
    pub prompt: String,
    /// Layers offloaded to the GPU (-1 lets the engine decide).
    pub n_gpu_layers: i32,
    /// Tokens to predict per generation (-1 = until stop token).
    pub n_predict: i32,
    /// Run the interactive REPL instead of serving.
    pub interactive: bool,
    /// RNG seed; `u32::MAX` means random.
    pub seed: u32,
    pub pooling: Pooling,
    /// -1 none, 0 max absolute int16, 1 taxicab, 2 euclidean, >2 p-norm.
    pub embd_normalize: i32,
    pub embd_output_format: EmbeddingFormat,
    /// Separator used to split and join embedding prompts.
    pub embd_separator: String,
    pub batch_size: u32,
    pub ubatch_size: u32,
    /// Where one-shot and embedding output goes instead of stdout.
    pub output_file: Option<PathBuf>,
    /// HTTP API bind address, optionally with a scheme.
    pub host: String,
    /// Extra comma-separated CORS origins.
    pub origins: String,
    /// Address of the RPC listener; the gateway dials this too.
    pub rpc_endpoint: String,
    pub gateway_addr: String,
    /// Start the RPC listener and gateway in server mode.
    pub enable_rpc: bool,
    pub llama_server_path: PathBuf,
    pub llama_cli_path: PathBuf,
    /// Port for the engine child process (0 picks a free one).
    pub engine_port: u16,
    /// Upper bound on waiting for the engine to report ready.
    pub startup_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            model: String::new(),
            ctx_size: 4096,
            prompt: String::new(),
            n_gpu_layers: -1,
            n_predict: 512,
            interactive: false,
            seed: u32::MAX,
            pooling: Pooling::Mean,
            embd_normalize: 2,
            embd_output_format: EmbeddingFormat::Json,
            embd_separator: "\n".to_string(),
            batch_size: 2048,
            ubatch_size: 512,
            output_file: None,
            host: DEFAULT_HOST.to_string(),
            origins: String::new(),
            rpc_endpoint: DEFAULT_RPC_ENDPOINT.to_string(),
            gateway_addr: DEFAULT_GATEWAY_ADDR.to_string(),
            enable_rpc: true,
            llama_server_path: PathBuf::from("llama-server"),
            llama_cli_path: PathBuf::from("llama-cli"),
            engine_port: 0,
            startup_timeout: Duration::from_secs(120),
        }
    }
}

impl Config {
    /// Check the invariants every execution mode relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.is_empty() {
            return Err(ConfigError::MissingModel);
        }
        if self.ctx_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ctx-size",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.ubatch_size > self.batch_size {
            return Err(ConfigError::InvalidValue {
                field: "ubatch-size",
                reason: format!(
                    "{} exceeds batch-size {}",
                    self.ubatch_size, self.batch_size
                ),
            });
        }
        Ok(())
    }

    /// True when the run generates once (or runs the REPL) and exits.
    pub fn is_lonely(&self) -> bool {
        !self.prompt.is_empty() || self.interactive
    }

    /// File stem of the model path, used as the model's public name.
    pub fn model_name(&self) -> &str {
        Path::new(&self.model)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.model)
    }

    /// Whether a client-supplied model name refers to the configured model.
    ///
    /// A `:latest` tag is ignored. The full configured path, its file name and
    /// its file stem are all accepted.
    pub fn matches_model(&self, requested: &str) -> bool {
        let requested = requested.strip_suffix(":latest").unwrap_or(requested);
        if requested == self.model || requested == self.model_name() {
            return true;
        }
        Path::new(&self.model)
            .file_name()
            .and_then(|s| s.to_str())
            .is_some_and(|name| name == requested)
    }

    /// Parse [`Config::host`] into a bindable URL.
    ///
    /// Without a scheme the URL is `http` on [`DEFAULT_PORT`]; an explicit
    /// `http://` or `https://` defaults to 80 or 443. A missing or invalid
    /// port falls back to that default with a warning.
    pub fn host_url(&self) -> HostUrl {
        let mut default_port = DEFAULT_PORT.to_string();
        let (scheme, hostport) = match self.host.split_once("://") {
            None => ("http", self.host.as_str()),
            Some(("http", rest)) => {
                default_port = "80".to_string();
                ("http", rest)
            }
            Some(("https", rest)) => {
                default_port = "443".to_string();
                ("https", rest)
            }
            Some((other, rest)) => (other, rest),
        };

        let (hostport, path) = hostport.split_once('/').unwrap_or((hostport, ""));

        let (host, port) = split_host_port(hostport).unwrap_or_else(|| {
            let trimmed = hostport.trim_start_matches('[').trim_end_matches(']');
            let host = match trimmed.parse::<IpAddr>() {
                Ok(ip) => ip.to_string(),
                Err(_) if !hostport.is_empty() => hostport.to_string(),
                Err(_) => "127.0.0.1".to_string(),
            };
            (host, default_port.clone())
        });

        let port = match port.parse::<i64>() {
            Ok(n) if (0..=65535).contains(&n) => port,
            _ => {
                warn!(port = %port, default = %default_port, "invalid port, using default");
                default_port
            }
        };

        HostUrl {
            scheme: scheme.to_string(),
            host,
            port: port.parse().unwrap_or(DEFAULT_PORT),
            path: path.to_string(),
        }
    }

    /// CORS origins: the configured list plus loopback and desktop defaults.
    pub fn allowed_origins(&self) -> Vec<String> {
        let mut origins: Vec<String> = if self.origins.is_empty() {
            Vec::new()
        } else {
            self.origins.split(',').map(|o| o.trim().to_string()).collect()
        };

        for origin in LOCAL_HOSTS {
            origins.push(format!("http://{origin}"));
            origins.push(format!("https://{origin}"));
            origins.push(format!("http://{}", join_host_port(origin, "*")));
            origins.push(format!("https://{}", join_host_port(origin, "*")));
        }

        origins.extend(DESKTOP_ORIGINS.iter().map(|o| (*o).to_string()));
        origins
    }

    /// Structured start parameters for the engine.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            model_path: PathBuf::from(&self.model),
            ctx_size: self.ctx_size,
            n_gpu_layers: self.n_gpu_layers,
            n_predict: self.n_predict,
            seed: self.seed,
            batch_size: self.batch_size,
            ubatch_size: self.ubatch_size,
            pooling: self.pooling,
            embd_normalize: self.embd_normalize,
            embd_separator: self.embd_separator.clone(),
            prompt: self.prompt.clone(),
        }
    }
}

/// Split `host:port`, accepting bracketed IPv6 hosts.
///
/// Returns `None` when there is no port separator or the host part is an
/// unbracketed address with extra colons.
fn split_host_port(hostport: &str) -> Option<(String, String)> {
    if let Some(rest) = hostport.strip_prefix('[') {
        let (host, after) = rest.split_once(']')?;
        let port = after.strip_prefix(':')?;
        return Some((host.to_string(), port.to_string()));
    }
    let (host, port) = hostport.rsplit_once(':')?;
    if host.contains(':') {
        return None;
    }
    Some((host.to_string(), port.to_string()))
}

fn join_host_port(host: &str, port: &str) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}
