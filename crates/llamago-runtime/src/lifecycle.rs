//! Lifecycle coordination: engine start in the background, listener tasks,
//! readiness, and an ordered, idempotent shutdown.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use llamago_core::{Engine, EngineConfig, EngineGate, EngineState};

use crate::error::LifecycleError;

/// How long each background task gets to finish during shutdown.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// A bound listener and the task serving it.
#[derive(Debug)]
struct ListenerHandle {
    name: &'static str,
    addr: SocketAddr,
    cancel: CancellationToken,
    join: JoinHandle<anyhow::Result<()>>,
}

/// Owns the engine session and every background task of a run.
///
/// Readiness is published over a watch channel that the [`EngineGate`]
/// reads, so API calls made while the model loads fail fast instead of
/// reaching the engine.
#[derive(Debug)]
pub struct Lifecycle {
    engine: Arc<dyn Engine>,
    engine_config: EngineConfig,
    state: Arc<watch::Sender<EngineState>>,
    gate: EngineGate,
    engine_task: Mutex<Option<JoinHandle<()>>>,
    listeners: Mutex<Vec<ListenerHandle>>,
    shut_down: AtomicBool,
}

impl Lifecycle {
    pub fn new(engine: Arc<dyn Engine>, engine_config: EngineConfig) -> Self {
        let (tx, rx) = watch::channel(EngineState::Stopped);
        let gate = EngineGate::new(Arc::clone(&engine), rx);
        Self {
            engine,
            engine_config,
            state: Arc::new(tx),
            gate,
            engine_task: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    /// The shared gate. Every clone serializes on the same lock.
    pub fn gate(&self) -> EngineGate {
        self.gate.clone()
    }

    pub fn state(&self) -> EngineState {
        self.state.borrow().clone()
    }

    /// Start the engine on a background task.
    ///
    /// Publishes `Loading` right away, then `Ready` or `Failed`.
    pub async fn start_engine(&self) {
        let mut slot = self.engine_task.lock().await;
        if slot.is_some() {
            warn!("engine already started");
            return;
        }

        self.state.send_replace(EngineState::Loading);
        let engine = Arc::clone(&self.engine);
        let config = self.engine_config.clone();
        let state = Arc::clone(&self.state);

        *slot = Some(tokio::spawn(async move {
            info!(model = %config.model_path.display(), "loading model");
            match engine.start(&config).await {
                Ok(()) => {
                    info!("engine ready");
                    state.send_replace(EngineState::Ready);
                }
                Err(e) => {
                    error!(error = %e, "engine failed to start");
                    state.send_replace(EngineState::Failed(e.to_string()));
                }
            }
        }));
    }

    /// Bind `addr` and serve it on a background task.
    ///
    /// Returns the bound address, or `None` when binding failed. Failures
    /// are logged and never affect other listeners.
    pub async fn spawn_listener<F, Fut>(
        &self,
        name: &'static str,
        addr: &str,
        serve: F,
    ) -> Option<SocketAddr>
    where
        F: FnOnce(TcpListener, CancellationToken) -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if self.shut_down.load(Ordering::SeqCst) {
            warn!(name, "not starting listener after shutdown");
            return None;
        }

        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(name, %addr, error = %e, "failed to bind listener");
                return None;
            }
        };
        let bound = match listener.local_addr() {
            Ok(bound) => bound,
            Err(e) => {
                error!(name, error = %e, "failed to read bound address");
                return None;
            }
        };

        let cancel = CancellationToken::new();
        let serving = serve(listener, cancel.clone());
        let join = tokio::spawn(async move {
            let result = serving.await;
            match &result {
                Ok(()) => debug!(name, "listener stopped"),
                Err(e) => error!(name, error = %e, "listener failed"),
            }
            result
        });

        info!(name, addr = %bound, "listener started");
        self.listeners.lock().await.push(ListenerHandle {
            name,
            addr: bound,
            cancel,
            join,
        });
        Some(bound)
    }

    /// Wait for the engine to become ready, at most `limit`.
    pub async fn wait_until_ready(&self, limit: Duration) -> Result<(), LifecycleError> {
        let mut rx = self.state.subscribe();
        let settled = rx.wait_for(|s| matches!(s, EngineState::Ready | EngineState::Failed(_)));

        match timeout(limit, settled).await {
            Err(_) => Err(LifecycleError::ReadinessTimeout(limit)),
            Ok(Err(_)) => Err(LifecycleError::Interrupted),
            Ok(Ok(state)) => match &*state {
                EngineState::Failed(reason) => Err(LifecycleError::EngineFailed(reason.clone())),
                _ => Ok(()),
            },
        }
    }

    /// Stop everything, in order: listeners, the engine, the engine task.
    ///
    /// Only the first call does any work. Errors are logged, not returned.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            debug!("shutdown already done");
            return;
        }
        info!("shutting down");

        let listeners = std::mem::take(&mut *self.listeners.lock().await);
        for listener in &listeners {
            listener.cancel.cancel();
        }
        for mut listener in listeners {
            match timeout(JOIN_TIMEOUT, &mut listener.join).await {
                Ok(Ok(_)) => debug!(name = listener.name, addr = %listener.addr, "listener joined"),
                Ok(Err(e)) => warn!(name = listener.name, error = %e, "listener task panicked"),
                Err(_) => {
                    warn!(name = listener.name, "listener did not stop in time, aborting");
                    listener.join.abort();
                }
            }
        }

        let task = self.engine_task.lock().await.take();
        let loading = matches!(self.state(), EngineState::Loading);

        self.stop_engine().await;

        if let Some(mut task) = task {
            match timeout(JOIN_TIMEOUT, &mut task).await {
                Err(_) => {
                    warn!("engine start did not finish in time, aborting");
                    task.abort();
                }
                // a start that was still loading registered its session after
                // the stop above
                Ok(_) if loading && matches!(self.state(), EngineState::Ready) => {
                    debug!("engine became ready during shutdown");
                    self.stop_engine().await;
                }
                Ok(_) => {}
            }
        }

        self.state.send_replace(EngineState::Stopped);
        info!("shutdown complete");
    }

    async fn stop_engine(&self) {
        if let Err(e) = self.engine.stop().await {
            error!(error = %e, "failed to stop engine");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llamago_core::testing::StubEngine;
    use llamago_core::{Config, EngineError};

    fn lifecycle(engine: Arc<StubEngine>) -> Lifecycle {
        let config = Config {
            model: "/models/tiny.gguf".to_string(),
            ..Config::default()
        };
        Lifecycle::new(engine, config.engine_config())
    }

    async fn idle(listener: TcpListener, cancel: CancellationToken) -> anyhow::Result<()> {
        cancel.cancelled().await;
        drop(listener);
        Ok(())
    }

    #[tokio::test]
    async fn engine_becomes_ready() {
        let stub = Arc::new(StubEngine::new());
        let lc = lifecycle(stub.clone());
        assert_eq!(lc.state(), EngineState::Stopped);

        lc.start_engine().await;
        lc.wait_until_ready(Duration::from_secs(5)).await.unwrap();
        assert_eq!(lc.state(), EngineState::Ready);
        assert_eq!(lc.gate().generate("hi".into()).await.unwrap(), stub.reply());
        assert_eq!(stub.start_calls(), 1);
    }

    #[tokio::test]
    async fn failed_start_is_reported() {
        let stub = Arc::new(StubEngine::new().with_start_failure("missing model"));
        let lc = lifecycle(stub);

        lc.start_engine().await;
        let err = lc.wait_until_ready(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, LifecycleError::EngineFailed(ref r) if r.contains("missing model")));
        assert_eq!(
            lc.gate().generate("hi".into()).await.unwrap_err(),
            EngineError::StartupFailed(EngineError::Start("missing model".into()).to_string())
        );
    }

    #[tokio::test]
    async fn readiness_wait_is_bounded() {
        let lc = lifecycle(Arc::new(StubEngine::new()));
        let err = lc
            .wait_until_ready(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::ReadinessTimeout(_)));
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let stub = Arc::new(StubEngine::new());
        let lc = lifecycle(stub.clone());
        lc.start_engine().await;
        lc.wait_until_ready(Duration::from_secs(5)).await.unwrap();

        lc.shutdown().await;
        lc.shutdown().await;

        assert_eq!(stub.stop_calls(), 1);
        assert!(!stub.is_live());
        assert_eq!(lc.state(), EngineState::Stopped);
    }

    #[tokio::test]
    async fn shutdown_while_loading_stops_the_late_session() {
        let stub = Arc::new(StubEngine::new().with_delay(Duration::from_millis(300)));
        let lc = lifecycle(stub.clone());

        lc.start_engine().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(lc.state(), EngineState::Loading);
        lc.shutdown().await;

        assert_eq!(stub.start_calls(), 1);
        assert!(!stub.is_live());
        assert_eq!(stub.stop_calls(), 2);
        assert_eq!(lc.state(), EngineState::Stopped);
    }

    #[tokio::test]
    async fn shutdown_without_start_still_stops_engine() {
        let stub = Arc::new(StubEngine::new());
        let lc = lifecycle(stub.clone());
        lc.shutdown().await;
        assert_eq!(stub.stop_calls(), 1);
        assert_eq!(stub.start_calls(), 0);
    }

    #[tokio::test]
    async fn bind_failure_leaves_other_listeners_running() {
        let lc = lifecycle(Arc::new(StubEngine::new()));
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let taken_addr = taken.local_addr().unwrap().to_string();

        let first = lc.spawn_listener("first", "127.0.0.1:0", idle).await;
        let second = lc.spawn_listener("second", &taken_addr, idle).await;

        assert!(first.is_some());
        assert!(second.is_none());
        assert!(tokio::net::TcpStream::connect(first.unwrap()).await.is_ok());
        lc.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_cancels_listeners() {
        let lc = lifecycle(Arc::new(StubEngine::new()));
        let addr = lc
            .spawn_listener("idle", "127.0.0.1:0", idle)
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), lc.shutdown())
            .await
            .expect("shutdown should not wait for the join timeout");
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
        assert!(lc.spawn_listener("late", "127.0.0.1:0", idle).await.is_none());
    }

    #[tokio::test]
    async fn failing_listener_does_not_block_shutdown() {
        let lc = lifecycle(Arc::new(StubEngine::new()));
        let addr = lc
            .spawn_listener("broken", "127.0.0.1:0", |_listener, _cancel| async {
                Err::<(), _>(anyhow::anyhow!("serve failed"))
            })
            .await;
        assert!(addr.is_some());
        lc.shutdown().await;
    }
}
