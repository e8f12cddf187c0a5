//! Lifecycle coordinator: gates process termination on engine shutdown.
//!
//! While the engine runs the coordinator is *guarded*: signals, explicit exits
//! and failures escaping a supervised scope only record a [`TerminationIntent`] and ask the engine
//! to stop. The watchdog polls the engine; once it reports stopped, the
//! recorded intent is carried out exactly once. Outside the guarded phase every
//! trigger terminates immediately.
//!
//! ```text
//! trigger ──► guarded? ──no──► terminate now
//!                │
//!               yes ──► record intent (first wins) ──► Engine::stop
//!                                                          │
//! watchdog tick ──► is_stopping? log ──► is_stopped? ──► perform intent
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use bitcoind_core::engine::{Engine, EngineStatus};
use bitcoind_core::error::NodeError;

use crate::intent::TerminationIntent;
use crate::interceptors::{self, SignalGuard};
use crate::logging::NodeLogger;
use crate::process::{ProcessAction, ProcessControl, TerminationSignal};

/// Where the coordinator is in the engine's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Engine not running (not started yet, or start failed).
    Idle,
    /// Engine running; terminations are deferred to the watchdog.
    Guarded,
    /// Watchdog saw the engine stop and performed the final action.
    Finished,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Guarded => write!(f, "guarded"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

struct State {
    phase: Phase,
    intent: TerminationIntent,
    stop_requested: bool,
    stopping_said: bool,
    runtime: Option<Handle>,
    watchdog: Option<JoinHandle<()>>,
    signals: HashMap<TerminationSignal, SignalGuard>,
}

struct Inner {
    engine: Arc<dyn Engine>,
    process: Arc<dyn ProcessControl>,
    logger: NodeLogger,
    watchdog_interval: Duration,
    terminated: AtomicBool,
    acted: AtomicBool,
    done: Notify,
    state: Mutex<State>,
}

/// Shared handle to the coordinator.
#[derive(Clone)]
pub struct Lifecycle {
    inner: Arc<Inner>,
}

/// Non-owning handle held by interceptors.
#[derive(Clone)]
pub struct WeakLifecycle {
    inner: Weak<Inner>,
}

impl WeakLifecycle {
    pub fn upgrade(&self) -> Option<Lifecycle> {
        self.inner.upgrade().map(|inner| Lifecycle { inner })
    }
}

impl Lifecycle {
    pub fn new(
        engine: Arc<dyn Engine>,
        process: Arc<dyn ProcessControl>,
        logger: NodeLogger,
        watchdog_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                process,
                logger,
                watchdog_interval,
                terminated: AtomicBool::new(false),
                acted: AtomicBool::new(false),
                done: Notify::new(),
                state: Mutex::new(State {
                    phase: Phase::Idle,
                    intent: TerminationIntent::None,
                    stop_requested: false,
                    stopping_said: false,
                    runtime: None,
                    watchdog: None,
                    signals: HashMap::new(),
                }),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakLifecycle {
        WeakLifecycle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn phase(&self) -> Phase {
        self.state().phase
    }

    /// The intent recorded so far (cleared once the watchdog acts on it).
    pub fn intent(&self) -> TerminationIntent {
        self.state().intent.clone()
    }

    /// `true` once a final process action has been performed.
    pub fn has_terminated(&self) -> bool {
        self.inner.terminated.load(Ordering::SeqCst)
    }

    /// Resolves once the final process action has been carried out.
    pub async fn terminated(&self) {
        loop {
            let notified = self.inner.done.notified();
            if self.inner.acted.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ─── Watchdog ─────────────────────────────────────────────────────────────

    /// Enter the guarded phase and start the watchdog. Must run inside a tokio
    /// runtime. Returns `false` (and does nothing) unless the phase is idle.
    pub fn begin_watchdog(&self) -> bool {
        let mut state = self.state();
        if state.phase != Phase::Idle {
            return false;
        }
        state.phase = Phase::Guarded;
        state.runtime = Some(Handle::current());
        state.watchdog = Some(tokio::spawn(watchdog(self.downgrade())));
        true
    }

    /// Abort the watchdog and leave the guarded phase (engine never started).
    pub fn cancel_watchdog(&self) {
        let mut state = self.state();
        if let Some(task) = state.watchdog.take() {
            task.abort();
        }
        if state.phase == Phase::Guarded {
            state.phase = Phase::Idle;
        }
    }

    /// One watchdog tick. Returns `true` once the engine has fully stopped.
    fn observe_engine(&self) -> bool {
        let stopped = self.inner.engine.is_stopped();
        let announce = {
            let mut state = self.state();
            let stopping = stopped || self.inner.engine.is_stopping();
            let announce = stopping && !state.stopping_said;
            if announce {
                state.stopping_said = true;
            }
            announce
        };
        if announce {
            self.inner.logger.log("shutting down...");
        }
        if stopped {
            self.inner.logger.log("shut down.");
        }
        stopped
    }

    async fn finish(&self) {
        let intent = {
            let mut state = self.state();
            state.phase = Phase::Finished;
            state.watchdog = None;
            std::mem::take(&mut state.intent)
        };
        tracing::info!(intent = %intent, "engine stopped");

        match intent {
            TerminationIntent::Signal(signal) => {
                self.release_signal(signal);
                tokio::task::yield_now().await;
                self.terminate(ProcessAction::Raise(signal));
            }
            TerminationIntent::ExitCode(code) => self.terminate(ProcessAction::Exit(code)),
            TerminationIntent::Failure(err) => {
                self.inner.logger.error(&err);
                self.terminate(ProcessAction::Exit(1));
            }
            TerminationIntent::None => self.terminate(ProcessAction::Exit(0)),
        }
    }

    // ─── Interceptors ─────────────────────────────────────────────────────────

    /// Install the signal interceptors this coordinator may own, and the
    /// panic message hook.
    pub fn install_interceptors(&self, signals: bool, panics: bool) {
        if signals {
            for signal in TerminationSignal::ALL {
                if self.state().signals.contains_key(&signal) {
                    continue;
                }
                match interceptors::intercept_signal(signal, self.downgrade()) {
                    Ok(Some(guard)) => {
                        self.state().signals.insert(signal, guard);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(signal = %signal, error = %e, "cannot intercept signal")
                    }
                }
            }
        }
        if panics {
            interceptors::install_panic_hook();
        }
    }

    /// Stop intercepting `signal` so its default disposition applies again.
    fn release_signal(&self, signal: TerminationSignal) {
        let guard = self.state().signals.remove(&signal);
        drop(guard);
    }

    /// Number of signals currently intercepted by this coordinator.
    pub fn intercepted_signals(&self) -> usize {
        self.state().signals.len()
    }

    // ─── Triggers ─────────────────────────────────────────────────────────────

    /// A termination signal was delivered.
    pub fn on_signal(&self, signal: TerminationSignal) {
        if !self.defer(TerminationIntent::Signal(signal)) {
            self.terminate(ProcessAction::Exit(0));
        }
    }

    /// Explicit process exit. Deferred while the engine runs, passthrough otherwise.
    pub fn exit(&self, code: i32) {
        if !self.defer(TerminationIntent::ExitCode(code)) {
            self.terminate(ProcessAction::Exit(code));
        }
    }

    /// A failure nothing in host code handled.
    pub fn on_failure(&self, error: String) {
        if !self.defer(TerminationIntent::Failure(error.clone())) {
            self.inner.logger.error(&error);
            self.terminate(ProcessAction::Exit(1));
        }
    }

    /// Record `intent` and request an engine stop if guarded.
    ///
    /// Returns `false` when not guarded; the caller terminates immediately.
    fn defer(&self, intent: TerminationIntent) -> bool {
        let request_stop = {
            let mut state = self.state();
            if state.phase != Phase::Guarded {
                return false;
            }
            if state.intent.record(intent) {
                tracing::info!(intent = %state.intent, "termination deferred until engine stops");
            }
            let first = !state.stop_requested;
            state.stop_requested = true;
            first.then(|| state.runtime.clone()).flatten()
        };
        if let Some(runtime) = request_stop {
            let lifecycle = self.clone();
            runtime.spawn(async move {
                if stop_engine(&lifecycle.inner.engine, &lifecycle.inner.logger)
                    .await
                    .is_err()
                {
                    lifecycle.state().stop_requested = false;
                }
            });
        }
        true
    }

    fn terminate(&self, action: ProcessAction) {
        if self.inner.terminated.swap(true, Ordering::SeqCst) {
            tracing::debug!(?action, "already terminated, ignoring");
            return;
        }
        match action {
            ProcessAction::Exit(code) => self.inner.process.exit(code),
            ProcessAction::Raise(signal) => self.inner.process.raise(signal),
        }
        self.inner.acted.store(true, Ordering::SeqCst);
        self.inner.done.notify_waiters();
    }
}

async fn watchdog(lifecycle: WeakLifecycle) {
    let Some(period) = lifecycle.upgrade().map(|l| l.inner.watchdog_interval) else {
        return;
    };
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(lifecycle) = lifecycle.upgrade() else {
            return;
        };
        if lifecycle.observe_engine() {
            lifecycle.finish().await;
            return;
        }
    }
}

/// Ask the engine to stop and log the outcome.
pub(crate) async fn stop_engine(
    engine: &Arc<dyn Engine>,
    logger: &NodeLogger,
) -> Result<EngineStatus, NodeError> {
    match engine.stop().await {
        Ok(status) => {
            logger.log(&status.message);
            Ok(status)
        }
        Err(e) => {
            logger.error(&e.to_string());
            Err(e)
        }
    }
}
