//! [`Engine`] implementation backed by llama.cpp child processes.
//!
//! `start` launches `llama-server` on a loopback port and waits for its
//! `/health` endpoint. Generation, chat and embedding are plain HTTP calls
//! to that child. The interactive REPL runs `llama-cli` in the foreground
//! with the terminal attached.

use std::net::TcpListener as StdTcpListener;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use llamago_core::{ChatMessage, Config, EmbeddingFormat, Engine, EngineConfig, EngineError};

use super::command::LlamaCommandBuilder;
use super::embedding;
use crate::health::wait_for_http_health;
use crate::shutdown::shutdown_child;

const LOOPBACK: &str = "127.0.0.1";

/// A live `llama-server` child and the settings it was started with.
#[derive(Debug)]
struct RunningServer {
    child: Child,
    base_url: String,
    config: EngineConfig,
}

/// Engine adapter that drives `llama-server` over HTTP.
///
/// At most one child is live per instance; starting again stops the
/// previous one first.
#[derive(Debug)]
pub struct LlamaServerEngine {
    server_path: PathBuf,
    cli_path: PathBuf,
    port: u16,
    startup_timeout: Duration,
    client: reqwest::Client,
    running: Mutex<Option<RunningServer>>,
}

impl LlamaServerEngine {
    pub fn new(server_path: impl Into<PathBuf>, cli_path: impl Into<PathBuf>) -> Self {
        Self {
            server_path: server_path.into(),
            cli_path: cli_path.into(),
            port: 0,
            startup_timeout: Duration::from_secs(120),
            client: reqwest::Client::new(),
            running: Mutex::new(None),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.llama_server_path, &config.llama_cli_path)
            .with_port(config.engine_port)
            .with_startup_timeout(config.startup_timeout)
    }

    /// Fixed port for the child; 0 picks a free one at start.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub const fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Base URL of the running child, if any.
    pub async fn base_url(&self) -> Option<String> {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|r| r.base_url.clone())
    }

    fn server_command(&self, config: &EngineConfig, port: u16) -> Command {
        let cmd = LlamaCommandBuilder::from_engine_config(&self.server_path, config)
            .arg_with_value("-b", config.batch_size.to_string())
            .arg_with_value("-ub", config.ubatch_size.to_string())
            .arg_with_value("--pooling", config.pooling.as_str())
            .flag("--embeddings")
            .arg_with_value("--host", LOOPBACK)
            .arg_with_value("--port", port.to_string())
            .build();

        let mut cmd = Command::from(cmd);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Address and settings of the running child, without holding the lock
    /// across the HTTP call.
    async fn session(&self) -> Result<(String, EngineConfig), EngineError> {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|r| (r.base_url.clone(), r.config.clone()))
            .ok_or(EngineError::NotReady)
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, String> {
        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = resp.status();
        let value: Value = resp.json().await.map_err(|e| e.to_string())?;
        if !status.is_success() {
            return Err(error_message(&value).unwrap_or_else(|| format!("engine returned {status}")));
        }
        Ok(value)
    }
}

#[async_trait]
impl Engine for LlamaServerEngine {
    async fn start(&self, config: &EngineConfig) -> Result<(), EngineError> {
        self.stop().await?;

        let port = if self.port == 0 {
            free_port().map_err(|e| EngineError::Start(format!("no free port: {e}")))?
        } else {
            self.port
        };
        let base_url = format!("http://{LOOPBACK}:{port}");

        info!(
            model = %config.model_path.display(),
            binary = %self.server_path.display(),
            port,
            "starting llama-server"
        );
        let mut child = self
            .server_command(config, port)
            .spawn()
            .map_err(|e| EngineError::Start(format!("{}: {e}", self.server_path.display())))?;
        spawn_log_readers(&mut child);

        if let Err(reason) =
            wait_for_http_health(&self.client, &base_url, &mut child, self.startup_timeout).await
        {
            if let Err(e) = shutdown_child(child).await {
                warn!(error = %e, "failed to reap llama-server after startup failure");
            }
            return Err(EngineError::Start(reason));
        }

        *self.running.lock().await = Some(RunningServer {
            child,
            base_url,
            config: config.clone(),
        });
        Ok(())
    }

    async fn stop(&self) -> Result<(), EngineError> {
        let Some(running) = self.running.lock().await.take() else {
            debug!("no llama-server to stop");
            return Ok(());
        };

        info!(base_url = %running.base_url, "stopping llama-server");
        let status = shutdown_child(running.child)
            .await
            .map_err(|e| EngineError::Stop(e.to_string()))?;
        debug!(?status, "llama-server exited");
        Ok(())
    }

    async fn generate(&self, prompt: &str) -> Result<String, EngineError> {
        let (base_url, config) = self.session().await?;
        let body = json!({
            "prompt": prompt,
            "n_predict": config.n_predict,
            "seed": config.seed,
            "stream": false,
        });

        let value = self
            .post_json(&format!("{base_url}/completion"), &body)
            .await
            .map_err(EngineError::Generation)?;
        value["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| EngineError::Generation("completion has no content".to_string()))
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, EngineError> {
        let (base_url, config) = self.session().await?;
        let mut body = json!({
            "messages": messages,
            "seed": config.seed,
            "stream": false,
        });
        if config.n_predict > 0 {
            body["max_tokens"] = json!(config.n_predict);
        }

        let value = self
            .post_json(&format!("{base_url}/v1/chat/completions"), &body)
            .await
            .map_err(EngineError::Generation)?;
        value["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| EngineError::Generation("chat completion has no content".to_string()))
    }

    async fn embed(&self, prompts: &str, format: EmbeddingFormat) -> Result<String, EngineError> {
        let (base_url, config) = self.session().await?;
        let inputs: Vec<String> = prompts
            .split(config.embd_separator.as_str())
            .map(str::to_string)
            .collect();

        let body = json!({ "input": inputs, "encoding_format": "float" });
        let value = self
            .post_json(&format!("{base_url}/v1/embeddings"), &body)
            .await
            .map_err(EngineError::Embedding)?;

        let vectors = parse_embeddings(&value).map_err(EngineError::Embedding)?;
        if vectors.len() != inputs.len() {
            return Err(EngineError::Embedding(format!(
                "{} != {}",
                vectors.len(),
                inputs.len()
            )));
        }

        let normalized: Vec<Vec<f32>> = vectors
            .iter()
            .map(|v| embedding::normalize(v, config.embd_normalize))
            .collect();
        embedding::render(&normalized, &inputs, format, config.embd_normalize)
            .map_err(|e| EngineError::Embedding(e.to_string()))
    }

    async fn interactive(&self, config: &EngineConfig) -> Result<(), EngineError> {
        let mut builder = LlamaCommandBuilder::from_engine_config(&self.cli_path, config)
            .arg_with_value("-b", config.batch_size.to_string())
            .arg_with_value("-ub", config.ubatch_size.to_string());
        if !config.prompt.is_empty() {
            builder = builder.arg_with_value("-p", config.prompt.clone());
        }
        let mut cmd = Command::from(builder.flag("-i").build());
        cmd.stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        info!(binary = %self.cli_path.display(), "starting interactive session");
        let status = cmd
            .status()
            .await
            .map_err(|e| EngineError::Interactive(format!("{}: {e}", self.cli_path.display())))?;
        if status.success() {
            Ok(())
        } else {
            Err(EngineError::Interactive(format!("llama-cli exited with {status}")))
        }
    }
}

/// Bind an ephemeral loopback port and release it for the child to take.
fn free_port() -> std::io::Result<u16> {
    let listener = StdTcpListener::bind((LOOPBACK, 0))?;
    Ok(listener.local_addr()?.port())
}

/// Forward the child's output to tracing, line by line.
fn spawn_log_readers(child: &mut Child) {
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "llama_server", "{line}");
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "llama_server", "{line}");
            }
        });
    }
}

/// llama-server reports errors as `{"error":{"message":...}}`.
fn error_message(value: &Value) -> Option<String> {
    let error = value.get("error")?;
    error
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| error.as_str())
        .map(str::to_string)
}

/// Vectors from an OpenAI-style embeddings response, ordered by `index`.
fn parse_embeddings(value: &Value) -> Result<Vec<Vec<f32>>, String> {
    let data = value["data"]
        .as_array()
        .ok_or_else(|| "embedding response has no data".to_string())?;

    let mut items: Vec<(u64, Vec<f32>)> = data
        .iter()
        .map(|item| {
            let index = item["index"].as_u64().unwrap_or_default();
            serde_json::from_value(item["embedding"].clone())
                .map(|v| (index, v))
                .map_err(|e| e.to_string())
        })
        .collect::<Result<_, _>>()?;
    items.sort_by_key(|(index, _)| *index);
    Ok(items.into_iter().map(|(_, v)| v).collect())
}
