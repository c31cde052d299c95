//! Serialized, readiness-checked access to the engine.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tracing::debug;

use crate::embedding::EmbeddingFormat;
use crate::engine::{ChatMessage, Engine, EngineError, EngineState};

/// Shared handle the API translators use to reach the engine.
///
/// Every call first checks the published [`EngineState`] and fails fast with
/// [`EngineError::NotReady`] while the model is loading. Calls that pass are
/// queued behind one async mutex, so the engine sees at most one generate,
/// chat or embed at a time.
///
/// Each call runs on its own task that owns the mutex guard. Dropping the
/// caller's future (for example when an HTTP client disconnects) therefore
/// never interrupts an engine call halfway.
#[derive(Debug, Clone)]
pub struct EngineGate {
    engine: Arc<dyn Engine>,
    lock: Arc<Mutex<()>>,
    state: watch::Receiver<EngineState>,
}

impl EngineGate {
    pub fn new(engine: Arc<dyn Engine>, state: watch::Receiver<EngineState>) -> Self {
        Self {
            engine,
            lock: Arc::new(Mutex::new(())),
            state,
        }
    }

    /// Snapshot of the current engine state.
    pub fn state(&self) -> EngineState {
        self.state.borrow().clone()
    }

    pub async fn generate(&self, prompt: String) -> Result<String, EngineError> {
        self.run("generate", move |engine| async move {
            engine.generate(&prompt).await
        })
        .await
    }

    pub async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, EngineError> {
        self.run("chat", move |engine| async move {
            engine.chat(&messages).await
        })
        .await
    }

    pub async fn embed(
        &self,
        prompts: String,
        format: EmbeddingFormat,
    ) -> Result<String, EngineError> {
        self.run("embed", move |engine| async move {
            engine.embed(&prompts, format).await
        })
        .await
    }

    fn ensure_ready(&self) -> Result<(), EngineError> {
        match &*self.state.borrow() {
            EngineState::Ready => Ok(()),
            EngineState::Failed(reason) => Err(EngineError::StartupFailed(reason.clone())),
            EngineState::Loading | EngineState::Stopped => Err(EngineError::NotReady),
        }
    }

    async fn run<F, Fut, T>(&self, op: &'static str, call: F) -> Result<T, EngineError>
    where
        F: FnOnce(Arc<dyn Engine>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, EngineError>> + Send + 'static,
        T: Send + 'static,
    {
        self.ensure_ready()?;

        let engine = Arc::clone(&self.engine);
        let lock = Arc::clone(&self.lock);
        let task = tokio::spawn(async move {
            let _guard = lock.lock_owned().await;
            debug!(op, "engine call started");
            let result = call(engine).await;
            debug!(op, ok = result.is_ok(), "engine call finished");
            result
        });

        task.await
            .map_err(|e| EngineError::Internal(format!("engine task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;
    use crate::testing::StubEngine;
    use std::time::Duration;

    fn ready_gate(engine: Arc<dyn Engine>) -> (EngineGate, watch::Sender<EngineState>) {
        let (tx, rx) = watch::channel(EngineState::Ready);
        (EngineGate::new(engine, rx), tx)
    }

    #[tokio::test]
    async fn loading_engine_is_not_called() {
        let mut mock = MockEngine::new();
        mock.expect_generate().never();
        let (tx, rx) = watch::channel(EngineState::Loading);
        let gate = EngineGate::new(Arc::new(mock), rx);

        let err = gate.generate("hi".into()).await.unwrap_err();
        assert_eq!(err, EngineError::NotReady);
        drop(tx);
    }

    #[tokio::test]
    async fn failed_engine_reports_startup_failure() {
        let mut mock = MockEngine::new();
        mock.expect_embed().never();
        let (_tx, rx) = watch::channel(EngineState::Failed("no such file".into()));
        let gate = EngineGate::new(Arc::new(mock), rx);

        let err = gate
            .embed("a".into(), EmbeddingFormat::Array)
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::StartupFailed("no such file".into()));
    }

    #[tokio::test]
    async fn ready_engine_receives_prompt() {
        let mut mock = MockEngine::new();
        mock.expect_generate()
            .withf(|prompt| prompt.to_string() == "hello")
            .times(1)
            .returning(|_| Ok("world".to_string()));
        let (gate, _tx) = ready_gate(Arc::new(mock));

        assert_eq!(gate.generate("hello".into()).await.unwrap(), "world");
    }

    #[tokio::test]
    async fn state_changes_are_observed() {
        let stub = Arc::new(StubEngine::new());
        let (tx, rx) = watch::channel(EngineState::Loading);
        let gate = EngineGate::new(stub.clone(), rx);
        assert!(gate.generate("x".into()).await.is_err());

        tx.send_replace(EngineState::Ready);
        assert!(gate.generate("x".into()).await.is_ok());
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn concurrent_calls_are_serialized() {
        let stub = Arc::new(StubEngine::new().with_delay(Duration::from_millis(20)));
        let (gate, _tx) = ready_gate(stub.clone());

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let gate = gate.clone();
                tokio::spawn(async move { gate.generate(format!("p{i}")).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(stub.calls(), 4);
        assert_eq!(stub.max_concurrency(), 1);
    }

    #[tokio::test]
    async fn dropped_caller_does_not_cancel_engine_call() {
        let stub = Arc::new(StubEngine::new().with_delay(Duration::from_millis(50)));
        let (gate, _tx) = ready_gate(stub.clone());

        let call = tokio::spawn({
            let gate = gate.clone();
            async move { gate.generate("abandoned".into()).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        call.abort();

        // The engine call still completes and releases the lock.
        let reply = gate.generate("next".into()).await.unwrap();
        assert_eq!(reply, stub.reply());
        assert_eq!(stub.completed(), 2);
    }
}
