//! Mode dispatch: what a run does once its configuration is known.

use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};

use llamago_core::{Config, Engine, ExecutionMode, select_mode};
use llamago_server::ApiState;

use crate::error::LifecycleError;
use crate::lifecycle::Lifecycle;
use crate::llama::LlamaServerEngine;
use crate::signal::shutdown_signal;

/// A configured run over one engine.
#[derive(Debug, Clone)]
pub struct App {
    config: Arc<Config>,
    engine: Arc<dyn Engine>,
}

impl App {
    pub fn new(config: Config, engine: Arc<dyn Engine>) -> Self {
        Self {
            config: Arc::new(config),
            engine,
        }
    }

    /// An app driving the `llama-server` and `llama-cli` binaries named in
    /// `config`.
    pub fn llama(config: Config) -> Self {
        let engine = Arc::new(LlamaServerEngine::from_config(&config));
        Self::new(config, engine)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn mode(&self) -> ExecutionMode {
        select_mode(&self.config)
    }

    /// Run the selected mode; server mode stops on Ctrl-C or SIGTERM.
    pub async fn run(&self) -> Result<(), LifecycleError> {
        self.run_until(shutdown_signal()).await
    }

    /// Run the selected mode, treating `shutdown` as the interrupt.
    pub async fn run_until<S>(&self, shutdown: S) -> Result<(), LifecycleError>
    where
        S: Future<Output = ()>,
    {
        self.config.validate()?;
        let mode = self.mode();
        info!(%mode, model = %self.config.model, "starting");

        match mode {
            ExecutionMode::Interactive => {
                self.engine
                    .interactive(&self.config.engine_config())
                    .await?;
                Ok(())
            }
            ExecutionMode::OneShot => self.one_shot(shutdown).await,
            ExecutionMode::Server => self.serve(shutdown).await,
        }
    }

    /// The `embedding` command: embed the configured prompt and emit the
    /// rendered output.
    pub async fn embedding<S>(&self, shutdown: S) -> Result<(), LifecycleError>
    where
        S: Future<Output = ()>,
    {
        self.config.validate()?;
        if self.config.prompt.is_empty() {
            return Err(LifecycleError::EmptyPrompt);
        }
        info!(format = %self.config.embd_output_format, "start embedding");

        let lifecycle = self.lifecycle();
        lifecycle.start_engine().await;
        let result = interruptible(shutdown, async {
            lifecycle
                .wait_until_ready(self.config.startup_timeout)
                .await?;
            let output = lifecycle
                .gate()
                .embed(self.config.prompt.clone(), self.config.embd_output_format)
                .await?;
            Ok::<_, LifecycleError>(output)
        })
        .await;
        lifecycle.shutdown().await;

        self.emit(&result?, Some("result:")).await
    }

    fn lifecycle(&self) -> Lifecycle {
        Lifecycle::new(Arc::clone(&self.engine), self.config.engine_config())
    }

    async fn one_shot<S>(&self, shutdown: S) -> Result<(), LifecycleError>
    where
        S: Future<Output = ()>,
    {
        let lifecycle = self.lifecycle();
        lifecycle.start_engine().await;
        let result = interruptible(shutdown, async {
            lifecycle
                .wait_until_ready(self.config.startup_timeout)
                .await?;
            let output = lifecycle.gate().generate(self.config.prompt.clone()).await?;
            Ok::<_, LifecycleError>(output)
        })
        .await;
        lifecycle.shutdown().await;

        self.emit(&result?, None).await
    }

    async fn serve<S>(&self, shutdown: S) -> Result<(), LifecycleError>
    where
        S: Future<Output = ()>,
    {
        let lifecycle = self.lifecycle();
        lifecycle.start_engine().await;

        match ApiState::new(Arc::clone(&self.config), lifecycle.gate()) {
            Ok(state) => {
                let addr = self.config.host_url().authority();
                lifecycle
                    .spawn_listener("http", &addr, move |listener, cancel| {
                        llamago_server::serve(listener, state, cancel)
                    })
                    .await;
            }
            Err(e) => warn!(error = %e, "HTTP API disabled: invalid prompt template"),
        }

        if self.config.enable_rpc {
            let gate = lifecycle.gate();
            let rpc = lifecycle
                .spawn_listener("rpc", &self.config.rpc_endpoint, move |listener, cancel| {
                    llamago_grpc::serve(listener, gate, cancel)
                })
                .await;

            // the gateway dials lazily, so it comes up even without an RPC listener
            let endpoint = rpc.map_or_else(
                || {
                    warn!(
                        endpoint = %self.config.rpc_endpoint,
                        "RPC listener not running, gateway dials the configured endpoint"
                    );
                    self.config.rpc_endpoint.clone()
                },
                |addr| addr.to_string(),
            );
            lifecycle
                .spawn_listener("gateway", &self.config.gateway_addr, move |listener, cancel| {
                    async move { llamago_grpc::serve_gateway(listener, &endpoint, cancel).await }
                })
                .await;
        }

        shutdown.await;
        lifecycle.shutdown().await;
        Ok(())
    }

    /// Write to the output file when one is configured, else to stdout.
    async fn emit(&self, output: &str, header: Option<&str>) -> Result<(), LifecycleError> {
        if let Some(path) = &self.config.output_file {
            tokio::fs::write(path, output).await?;
            info!(path = %path.display(), "output written");
        } else {
            if let Some(header) = header {
                println!("{header}");
            }
            println!("{output}");
        }
        Ok(())
    }
}

/// Run `work` unless `shutdown` resolves first.
async fn interruptible<S, F, T>(shutdown: S, work: F) -> Result<T, LifecycleError>
where
    S: Future<Output = ()>,
    F: Future<Output = Result<T, LifecycleError>>,
{
    tokio::select! {
        result = work => result,
        () = shutdown => Err(LifecycleError::Interrupted),
    }
}
