//! The persistent fetch engine
//!
//! The engine owns the HTTP client, a task queue and a heartbeat. Tasks are
//! pulled off the queue and fetched concurrently (bounded by a semaphore);
//! each outcome is handed to the `OutcomeSink` exactly once. On every
//! heartbeat with nothing queued or in flight the engine emits an idle
//! signal; unless a subscriber answers `KeepAlive` it closes itself, like a
//! spider that ran out of work.
//!
//! Once closed, every task still queued or scheduled later is answered with
//! an `EngineStopped` failure, so no caller is left waiting.

use crate::config::{EngineConfig, UserAgentConfig};
use crate::engine::fetcher::{build_http_client, execute};
use crate::engine::fingerprint::DupeFilter;
use crate::engine::task::{
    FailureKind, FetchFailure, FetchOutcome, FetchTask, OutcomeSink, RequestId, WorkerId,
};
use crate::BotError;
use reqwest::Client;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Lifecycle of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Created,
    Running,
    Closed,
}

/// Answer of an idle subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleVerdict {
    /// Veto the shutdown
    KeepAlive,
    /// No objection to closing
    Close,
}

type IdleHandler = Box<dyn Fn(&WorkerId) -> IdleVerdict + Send + Sync>;

/// Event-driven fetch worker shared by all requests
pub struct FetchEngine {
    worker: WorkerId,
    client: Client,
    sink: Arc<dyn OutcomeSink>,
    semaphore: Arc<Semaphore>,
    dupefilter: DupeFilter,
    idle_interval: Duration,
    idle_handlers: RwLock<Vec<IdleHandler>>,
    state: watch::Sender<EngineState>,
    stop: Notify,
    queue_tx: mpsc::UnboundedSender<FetchTask>,
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<FetchTask>>>,
    /// Tasks queued or in flight
    pending: AtomicUsize,
    idle_signals: AtomicU64,
}

impl FetchEngine {
    /// Creates an engine with one open worker; call `start` to run it
    pub fn new(
        config: &EngineConfig,
        user_agent: &UserAgentConfig,
        sink: Arc<dyn OutcomeSink>,
    ) -> Result<Arc<Self>, BotError> {
        if config.max_concurrent_fetches == 0 {
            return Err(BotError::EngineStart(
                "max-concurrent-fetches must be at least 1".to_string(),
            ));
        }
        if config.idle_interval_ms == 0 {
            return Err(BotError::EngineStart(
                "idle-interval-ms must be greater than 0".to_string(),
            ));
        }

        let client = build_http_client(config, user_agent)?;
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(EngineState::Created);

        Ok(Arc::new(Self {
            worker: WorkerId::new(&config.worker_name),
            client,
            sink,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_fetches as usize)),
            dupefilter: DupeFilter::new(),
            idle_interval: config.idle_interval(),
            idle_handlers: RwLock::new(Vec::new()),
            state,
            stop: Notify::new(),
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            pending: AtomicUsize::new(0),
            idle_signals: AtomicU64::new(0),
        }))
    }

    /// Spawns the engine loop on the current runtime
    ///
    /// An engine can be started once; a closed engine stays closed.
    pub fn start(self: &Arc<Self>) -> Result<JoinHandle<()>, BotError> {
        let rx = self
            .queue_rx
            .lock()
            .map_err(|_| BotError::EngineStart("task queue lock poisoned".to_string()))?
            .take()
            .ok_or_else(|| BotError::EngineStart("engine was already started".to_string()))?;

        self.state.send_replace(EngineState::Running);
        info!(worker = %self.worker, "fetch engine started");

        let engine = Arc::clone(self);
        Ok(tokio::spawn(engine.run(rx)))
    }

    /// Asks the engine loop to close
    pub fn stop(&self) {
        self.stop.notify_one();
    }

    /// Subscribes to idle signals
    pub fn connect_idle<F>(&self, handler: F)
    where
        F: Fn(&WorkerId) -> IdleVerdict + Send + Sync + 'static,
    {
        let mut handlers = match self.idle_handlers.write() {
            Ok(handlers) => handlers,
            Err(poisoned) => poisoned.into_inner(),
        };
        handlers.push(Box::new(handler));
    }

    /// Queues a task for the given worker
    ///
    /// Fire-and-forget: the outcome always arrives through the sink, including
    /// when the worker is unknown or the engine has closed.
    pub fn schedule(&self, task: FetchTask, worker: &WorkerId) {
        if worker != &self.worker {
            self.sink.deliver(
                task.id,
                Err(FetchFailure::new(
                    FailureKind::WorkerClosed,
                    format!("Worker '{}' is not open on this engine", worker),
                )),
            );
            return;
        }

        self.pending.fetch_add(1, Ordering::SeqCst);
        if let Err(mpsc::error::SendError(task)) = self.queue_tx.send(task) {
            self.finish(task.id, Err(engine_stopped()));
        }
    }

    pub fn worker(&self) -> &WorkerId {
        &self.worker
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == EngineState::Running
    }

    /// Number of tasks queued or in flight
    pub fn pending_tasks(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Number of idle signals emitted so far
    pub fn idle_signal_count(&self) -> u64 {
        self.idle_signals.load(Ordering::SeqCst)
    }

    async fn run(self: Arc<Self>, rx: mpsc::UnboundedReceiver<FetchTask>) {
        let mut guard = RunGuard {
            engine: Arc::clone(&self),
            rx,
        };

        let mut heartbeat = tokio::time::interval(self.idle_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        heartbeat.tick().await;

        loop {
            tokio::select! {
                _ = self.stop.notified() => {
                    info!(worker = %self.worker, "fetch engine stop requested");
                    break;
                }
                task = guard.rx.recv() => match task {
                    Some(task) => self.dispatch(task),
                    None => break,
                },
                _ = heartbeat.tick() => {
                    if self.pending_tasks() == 0 && self.signal_idle() == IdleVerdict::Close {
                        info!(worker = %self.worker, "fetch engine idle, closing");
                        break;
                    }
                }
            }
        }

        drop(guard);
        info!(worker = %self.worker, "fetch engine closed");
    }

    fn dispatch(self: &Arc<Self>, task: FetchTask) {
        if !task.dont_filter && !self.dupefilter.insert(&task.params) {
            debug!(request_id = %task.id, url = %task.params.url, "filtered duplicate request");
            let failure = FetchFailure::new(
                FailureKind::Filtered,
                format!("Filtered duplicate request: {}", task.params.url),
            );
            self.finish(task.id, Err(failure));
            return;
        }

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = match Arc::clone(&engine.semaphore).acquire_owned().await {
                Ok(_permit) => {
                    debug!(
                        request_id = %task.id,
                        method = %task.params.method,
                        url = %task.params.url,
                        "fetching"
                    );
                    execute(&engine.client, &task).await
                }
                Err(_) => Err(engine_stopped()),
            };
            engine.finish(task.id, outcome);
        });
    }

    fn finish(&self, id: RequestId, outcome: FetchOutcome) {
        self.sink.deliver(id, outcome);
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }

    /// Notifies every idle subscriber; any `KeepAlive` vetoes the close
    fn signal_idle(&self) -> IdleVerdict {
        self.idle_signals.fetch_add(1, Ordering::SeqCst);

        let handlers = match self.idle_handlers.read() {
            Ok(handlers) => handlers,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut verdict = IdleVerdict::Close;
        for handler in handlers.iter() {
            if handler(&self.worker) == IdleVerdict::KeepAlive {
                verdict = IdleVerdict::KeepAlive;
            }
        }

        debug!(worker = %self.worker, ?verdict, "fetch engine idle");
        verdict
    }
}

/// Closes the engine however its loop exits, panics included
///
/// Tasks still queued are answered with `EngineStopped`.
struct RunGuard {
    engine: Arc<FetchEngine>,
    rx: mpsc::UnboundedReceiver<FetchTask>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.engine.state.send_replace(EngineState::Closed);

        self.rx.close();
        while let Ok(task) = self.rx.try_recv() {
            self.engine.finish(task.id, Err(engine_stopped()));
        }
    }
}

fn engine_stopped() -> FetchFailure {
    FetchFailure::new(
        FailureKind::EngineStopped,
        "Fetch engine is not running".to_string(),
    )
}
