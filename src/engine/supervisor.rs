//! Engine supervisor
//!
//! Owns the one fetch engine for the lifetime of the service. The engine
//! would close itself whenever it runs out of work; the supervisor vetoes
//! every idle signal so it stays open until `shutdown` is called.

use crate::config::Config;
use crate::engine::core::{EngineState, FetchEngine, IdleVerdict};
use crate::engine::task::{OutcomeSink, WorkerId};
use crate::BotError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Keeps a fetch engine running until explicitly shut down
pub struct EngineSupervisor {
    engine: Arc<FetchEngine>,
    vetoes: Arc<AtomicU64>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl EngineSupervisor {
    /// Builds the engine from configuration and starts supervising it
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: &Config, sink: Arc<dyn OutcomeSink>) -> Result<Self, BotError> {
        let engine = FetchEngine::new(&config.engine, &config.user_agent, sink)?;
        Self::supervise(engine)
    }

    /// Registers the idle veto on an existing engine and starts it
    pub fn supervise(engine: Arc<FetchEngine>) -> Result<Self, BotError> {
        let vetoes = Arc::new(AtomicU64::new(0));

        let counter = Arc::clone(&vetoes);
        engine.connect_idle(move |worker| {
            counter.fetch_add(1, Ordering::SeqCst);
            debug!(worker = %worker, "keeping it open");
            IdleVerdict::KeepAlive
        });

        let handle = engine.start()?;
        info!(worker = %engine.worker(), "bot initialized");

        Ok(Self {
            engine,
            vetoes,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn engine(&self) -> &Arc<FetchEngine> {
        &self.engine
    }

    /// The worker identity every fetch is scheduled under
    pub fn worker(&self) -> &WorkerId {
        self.engine.worker()
    }

    pub fn is_running(&self) -> bool {
        self.engine.state() == EngineState::Running
    }

    /// Number of idle shutdowns vetoed so far
    pub fn idle_vetoes(&self) -> u64 {
        self.vetoes.load(Ordering::SeqCst)
    }

    /// Stops the engine and waits for its loop to finish
    pub async fn shutdown(&self) {
        self.engine.stop();

        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("fetch engine task ended abnormally: {}", e);
            }
        }
        info!(worker = %self.engine.worker(), "bot shut down");
    }
}
