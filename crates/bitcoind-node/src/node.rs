//! `BitcoinNode`: the host-facing handle around a native engine.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bitcoind_core::{EventKind, MemoryEngine, NodeEvent};
//! use bitcoind_node::{BitcoinNode, NodeBuilder};
//!
//! # async fn main_body() -> Result<(), bitcoind_core::NodeError> {
//! let node = BitcoinNode::new(NodeBuilder::new().build_config(), Arc::new(MemoryEngine::new()));
//! let mut blocks = node.subscribe(EventKind::Block);
//! node.start().await?;
//! node.run(async move {
//!     while let Some(NodeEvent::Block(block)) = blocks.recv().await {
//!         println!("block {}", block.hash);
//!     }
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use bitcoind_core::dedup::SeenSet;
use bitcoind_core::engine::{Engine, EngineStatus};
use bitcoind_core::error::NodeError;
use bitcoind_core::events::{EventBus, EventKind, NodeEvent};
use bitcoind_core::types::{Block, Transaction};

use crate::config::NodeConfig;
use crate::interceptors;
use crate::lifecycle::{self, Lifecycle};
use crate::log_pipe;
use crate::logging::NodeLogger;
use crate::poller::{LoopKind, Pollers};
use crate::process::{ProcessControl, SystemProcess};

/// A running (or startable) engine plus its lifecycle and event plumbing.
#[derive(Clone)]
pub struct BitcoinNode {
    config: Arc<NodeConfig>,
    engine: Arc<dyn Engine>,
    bus: EventBus,
    seen: SeenSet,
    pollers: Pollers,
    lifecycle: Lifecycle,
    logger: NodeLogger,
    pipe_task: Arc<Mutex<Option<JoinHandle<usize>>>>,
}

impl BitcoinNode {
    /// Create a node that terminates the real OS process on shutdown.
    pub fn new(config: NodeConfig, engine: Arc<dyn Engine>) -> Self {
        Self::with_process(config, engine, Arc::new(SystemProcess))
    }

    /// Create a node with a custom process-termination backend.
    pub fn with_process(
        config: NodeConfig,
        engine: Arc<dyn Engine>,
        process: Arc<dyn ProcessControl>,
    ) -> Self {
        let logger = NodeLogger::new(config.log_prefix.clone());
        let bus = EventBus::new();
        let seen = SeenSet::new();
        let pollers = Pollers::new(engine.clone(), seen.clone(), bus.clone(), config.poll_interval());
        let lifecycle = Lifecycle::new(
            engine.clone(),
            process,
            logger.clone(),
            config.watchdog_interval(),
        );
        Self {
            config: Arc::new(config),
            engine,
            bus,
            seen,
            pollers,
            lifecycle,
            logger,
            pipe_task: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the engine.
    ///
    /// The shutdown watchdog is running from this point on. On completion the
    /// interceptors are installed, `open` or `error` is emitted, and loops
    /// demanded by earlier subscriptions begin polling.
    ///
    /// Fails with [`NodeError::AlreadyStarted`] without touching the engine
    /// if a start already succeeded (or is in progress).
    pub async fn start(&self) -> Result<EngineStatus, NodeError> {
        if !self.lifecycle.begin_watchdog() {
            return Err(NodeError::AlreadyStarted);
        }

        let result = self.engine.start(&self.config.engine).await;

        self.lifecycle
            .install_interceptors(self.config.intercept_signals, self.config.intercept_panics);

        match &result {
            Ok(status) => {
                tracing::info!(status = %status, "engine started");
                self.bus.emit(NodeEvent::Open(status.clone()));
                self.pollers.arm();
                self.open_log_pipe();
            }
            Err(e) => {
                tracing::error!(error = %e, "engine failed to start");
                self.lifecycle.cancel_watchdog();
                self.bus.emit(NodeEvent::Error(e.to_string()));
            }
        }
        result
    }

    fn open_log_pipe(&self) {
        let Some(pipe) = self.engine.log_pipe() else {
            return;
        };
        self.logger.log("log pipe opened");
        let task = log_pipe::spawn_stdout_forwarder(pipe, self.config.pipe_prefix.clone());
        *self.pipe_task.lock().unwrap() = Some(task);
    }

    /// Ask the engine to stop. The watchdog then ends the process.
    pub async fn stop(&self) -> Result<EngineStatus, NodeError> {
        lifecycle::stop_engine(&self.engine, &self.logger).await
    }

    /// Alias of [`BitcoinNode::stop`].
    pub async fn close(&self) -> Result<EngineStatus, NodeError> {
        self.stop().await
    }

    /// Subscribe to one event kind, activating the poll loops it needs.
    pub fn subscribe(&self, kind: EventKind) -> mpsc::UnboundedReceiver<NodeEvent> {
        self.subscribe_many([kind])
    }

    /// Subscribe to several kinds on one channel, in emission order.
    pub fn subscribe_many(
        &self,
        kinds: impl IntoIterator<Item = EventKind>,
    ) -> mpsc::UnboundedReceiver<NodeEvent> {
        let kinds: Vec<EventKind> = kinds.into_iter().collect();
        let rx = self.bus.subscribe(kinds.iter().copied());
        for kind in kinds {
            let listeners = self.bus.listener_count(kind);
            tracing::debug!(event = %kind, listeners, "subscribed");
            for &poll_loop in LoopKind::required_by(kind) {
                self.pollers.demand(poll_loop);
            }
        }
        rx
    }

    pub async fn get_block(&self, hash: &str) -> Result<Block, NodeError> {
        self.engine.get_block(hash).await
    }

    pub async fn get_transaction(
        &self,
        tx_hash: &str,
        block_hash: Option<&str>,
    ) -> Result<Transaction, NodeError> {
        self.engine.get_transaction(tx_hash, block_hash).await
    }

    /// Alias of [`BitcoinNode::get_transaction`].
    pub async fn get_tx(
        &self,
        tx_hash: &str,
        block_hash: Option<&str>,
    ) -> Result<Transaction, NodeError> {
        self.get_transaction(tx_hash, block_hash).await
    }

    /// Exit the process with `code`, after the engine has stopped if it is running.
    pub fn exit(&self, code: i32) {
        self.lifecycle.exit(code);
    }

    /// Report a fatal host failure, as if it escaped [`BitcoinNode::run`].
    pub fn report_failure(&self, error: impl std::fmt::Display) {
        self.lifecycle.on_failure(error.to_string());
    }

    /// Run host code under supervision.
    ///
    /// A panic escaping `body` is an uncaught failure: it is reported to the
    /// coordinator and this call then waits until the final process action
    /// has run, so a running engine is stopped before anything unwinds
    /// further. Panics caught inside `body` are never seen here. Returns
    /// `Err(NodeError::Other)` with the panic message only when the process
    /// action did not end the process.
    ///
    /// With `intercept_panics` disabled, panics propagate unchanged.
    pub async fn run<F: Future>(&self, body: F) -> Result<F::Output, NodeError> {
        if !self.config.intercept_panics {
            return Ok(body.await);
        }
        let message = match AssertUnwindSafe(body).catch_unwind().await {
            Ok(output) => return Ok(output),
            Err(payload) => interceptors::panic_message(payload.as_ref()),
        };
        tracing::error!(error = %message, "uncaught panic in host code");
        self.lifecycle.on_failure(message.clone());
        self.lifecycle.terminated().await;
        Err(NodeError::Other(message))
    }

    /// Spawn a supervised task. See [`BitcoinNode::run`]; the task yields
    /// `None` when its body panicked.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<Option<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let node = self.clone();
        tokio::spawn(async move { node.run(task).await.ok() })
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn pollers(&self) -> &Pollers {
        &self.pollers
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    pub fn logger(&self) -> &NodeLogger {
        &self.logger
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Handle of the log-pipe forwarder, if the engine exposed a pipe.
    pub fn take_log_pipe_task(&self) -> Option<JoinHandle<usize>> {
        self.pipe_task.lock().unwrap().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use bitcoind_core::memory::MemoryEngine;

    use crate::builder::NodeBuilder;
    use crate::lifecycle::Phase;
    use crate::process::{ProcessAction, RecordingProcess};

    fn quiet_config() -> NodeConfig {
        NodeBuilder::new()
            .poll_interval_ms(5)
            .watchdog_interval_ms(10)
            .intercept_signals(false)
            .intercept_panics(false)
            .engine_params(serde_json::json!({ "datadir": "/tmp/regtest" }))
            .build_config()
    }

    fn node(engine: Arc<MemoryEngine>) -> (BitcoinNode, Arc<RecordingProcess>) {
        let process = Arc::new(RecordingProcess::new());
        (BitcoinNode::with_process(quiet_config(), engine, process.clone()), process)
    }

    #[tokio::test]
    async fn start_emits_open_and_passes_params() {
        let engine = Arc::new(MemoryEngine::new());
        let (node, _) = node(engine.clone());
        let mut rx = node.subscribe(EventKind::Open);

        let status = node.start().await.unwrap();

        assert_eq!(rx.recv().await, Some(NodeEvent::Open(status)));
        assert_eq!(engine.start_params().unwrap()["datadir"], "/tmp/regtest");
        assert_eq!(node.lifecycle().phase(), Phase::Guarded);
        assert!(node.pollers().is_armed());
    }

    #[tokio::test]
    async fn failed_start_emits_error_and_stays_idle() {
        let engine = Arc::new(MemoryEngine::new().with_start_error("bad datadir"));
        let (node, process) = node(engine);
        let mut rx = node.subscribe(EventKind::Error);

        let err = node.start().await.unwrap_err();

        assert!(matches!(err, NodeError::StartFailed(_)));
        assert!(matches!(rx.recv().await, Some(NodeEvent::Error(msg)) if msg.contains("bad datadir")));
        assert_eq!(node.lifecycle().phase(), Phase::Idle);
        assert!(!node.pollers().is_armed());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(process.actions().is_empty());
    }

    #[tokio::test]
    async fn subscription_activates_required_loops() {
        let engine = Arc::new(MemoryEngine::new());
        let (node, _) = node(engine);
        node.start().await.unwrap();

        let _blocks = node.subscribe(EventKind::Block);
        assert!(node.pollers().is_active(LoopKind::Blocks));
        assert!(!node.pollers().is_active(LoopKind::Mempool));

        let _txs = node.subscribe(EventKind::Tx);
        assert!(node.pollers().is_active(LoopKind::Mempool));
    }

    #[tokio::test]
    async fn open_subscription_activates_nothing() {
        let engine = Arc::new(MemoryEngine::new());
        let (node, _) = node(engine.clone());
        let _open = node.subscribe(EventKind::Open);
        node.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(engine.block_polls(), 0);
        assert_eq!(engine.mempool_polls(), 0);
    }

    #[tokio::test]
    async fn second_start_does_not_restart_engine() {
        let engine = Arc::new(MemoryEngine::new());
        let (node, _) = node(engine.clone());
        let mut rx = node.subscribe(EventKind::Open);
        node.start().await.unwrap();

        let err = node.start().await.unwrap_err();

        assert!(matches!(err, NodeError::AlreadyStarted));
        assert_eq!(engine.start_calls(), 1);
        assert!(matches!(rx.recv().await, Some(NodeEvent::Open(_))));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn start_after_failed_start_is_allowed() {
        let engine = Arc::new(MemoryEngine::new().with_start_error("locked datadir"));
        let (node, _) = node(engine.clone());
        node.start().await.unwrap_err();
        node.start().await.unwrap_err();
        assert_eq!(engine.start_calls(), 2);
    }

    #[tokio::test]
    async fn run_returns_body_output() {
        let (node, process) = node(Arc::new(MemoryEngine::new()));
        node.start().await.unwrap();
        assert_eq!(node.run(async { 21 * 2 }).await.unwrap(), 42);
        assert!(process.actions().is_empty());
    }

    #[tokio::test]
    async fn unsupervised_spawn_panics_propagate() {
        let engine = Arc::new(MemoryEngine::new());
        let (node, process) = node(engine.clone());
        node.start().await.unwrap();

        let joined = node.spawn(async { panic!("left to the caller") }).await;

        assert!(joined.is_err());
        assert_eq!(node.lifecycle().intent(), crate::intent::TerminationIntent::None);
        assert_eq!(engine.stop_calls(), 0);
        assert!(process.actions().is_empty());
    }

    #[tokio::test]
    async fn stop_and_close_reach_engine() {
        let engine = Arc::new(MemoryEngine::new().with_stop_lag(100));
        let (node, _) = node(engine.clone());
        node.start().await.unwrap();
        node.stop().await.unwrap();
        node.close().await.unwrap();
        assert_eq!(engine.stop_calls(), 2);
    }

    #[tokio::test]
    async fn stop_error_is_returned() {
        let engine = Arc::new(MemoryEngine::new().with_stop_error("rpc down"));
        let (node, _) = node(engine);
        let err = node.stop().await.unwrap_err();
        assert!(matches!(err, NodeError::StopFailed(_)));
    }

    #[tokio::test]
    async fn explicit_stop_ends_with_exit_zero() {
        let engine = Arc::new(MemoryEngine::new());
        let (node, process) = node(engine);
        node.start().await.unwrap();
        node.stop().await.unwrap();

        let action = tokio::time::timeout(Duration::from_secs(2), process.first_action())
            .await
            .unwrap();
        assert_eq!(action, ProcessAction::Exit(0));
    }

    #[tokio::test]
    async fn lookups_pass_through() {
        let engine = Arc::new(
            MemoryEngine::new().with_block(Block::new("B9").with_tx(Transaction::new("T9"))),
        );
        let (node, _) = node(engine);

        assert_eq!(node.get_block("B9").await.unwrap().tx.len(), 1);
        assert_eq!(node.get_tx("T9", None).await.unwrap().hash, "T9");
        assert_eq!(node.get_transaction("T9", Some("B9")).await.unwrap().hash, "T9");
        assert!(node.get_block("B0").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn log_pipe_is_forwarded() {
        let engine = Arc::new(MemoryEngine::new().with_log_output("init message\nready\n"));
        let (node, _) = node(engine);
        node.start().await.unwrap();

        let task = node.take_log_pipe_task().expect("pipe forwarder");
        assert_eq!(task.await.unwrap(), 2);
    }
}
