//! Block and mempool poll loops.
//!
//! Each loop repeatedly asks the engine for new items, skips anything already
//! in the [`SeenSet`], emits the rest, then sleeps for the poll interval. Poll
//! errors are absorbed and retried after the same interval; a loop never ends
//! on its own.
//!
//! The block loop emits `block` and then one `tx` per contained transaction.
//! Those per-block transactions are *not* deduplicated, so a transaction first
//! seen in the mempool is reported again when it confirms.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bitcoind_core::dedup::SeenSet;
use bitcoind_core::engine::Engine;
use bitcoind_core::error::NodeError;
use bitcoind_core::events::{EventBus, EventKind, NodeEvent};
use bitcoind_core::types::{Block, Transaction};

/// Which poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopKind {
    Blocks,
    Mempool,
}

impl LoopKind {
    /// Loops that must run for subscribers of `event` to receive anything.
    pub fn required_by(event: EventKind) -> &'static [LoopKind] {
        match event {
            EventKind::Block => &[LoopKind::Blocks],
            EventKind::Tx => &[LoopKind::Blocks, LoopKind::Mempool],
            EventKind::MempoolTx => &[LoopKind::Mempool],
            EventKind::Open | EventKind::Error => &[],
        }
    }
}

impl std::fmt::Display for LoopKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blocks => write!(f, "blocks"),
            Self::Mempool => write!(f, "mempool"),
        }
    }
}

#[derive(Default)]
struct PollState {
    wanted: AtomicBool,
    active: AtomicBool,
}

struct Inner {
    engine: Arc<dyn Engine>,
    seen: SeenSet,
    bus: EventBus,
    interval: Duration,
    armed: AtomicBool,
    blocks: PollState,
    mempool: PollState,
}

impl Inner {
    fn state(&self, kind: LoopKind) -> &PollState {
        match kind {
            LoopKind::Blocks => &self.blocks,
            LoopKind::Mempool => &self.mempool,
        }
    }

    /// Poll once and emit what is new. Returns the number of new items.
    async fn poll_once(&self, kind: LoopKind) -> Result<usize, NodeError> {
        match kind {
            LoopKind::Blocks => {
                let blocks = self.engine.poll_blocks().await?;
                Ok(self.emit_blocks(blocks).await)
            }
            LoopKind::Mempool => {
                let txs = self.engine.poll_mempool().await?;
                Ok(self.emit_mempool(txs).await)
            }
        }
    }

    async fn emit_blocks(&self, blocks: Vec<Block>) -> usize {
        let mut emitted = 0;
        for block in blocks {
            if self.seen.insert(&block.hash) {
                emitted += 1;
                self.bus.emit(NodeEvent::Block(block.clone()));
                for tx in block.tx {
                    self.bus.emit(NodeEvent::Tx(tx));
                    tokio::task::yield_now().await;
                }
            }
            tokio::task::yield_now().await;
        }
        emitted
    }

    async fn emit_mempool(&self, txs: Vec<Transaction>) -> usize {
        let mut emitted = 0;
        for tx in txs {
            if self.seen.insert(&tx.hash) {
                emitted += 1;
                self.bus.emit(NodeEvent::MempoolTx(tx.clone()));
                self.bus.emit(NodeEvent::Tx(tx));
            }
            tokio::task::yield_now().await;
        }
        emitted
    }
}

async fn poll_forever(inner: Arc<Inner>, kind: LoopKind) {
    tracing::info!(poll_loop = %kind, interval_ms = inner.interval.as_millis() as u64, "poll loop started");
    loop {
        match inner.poll_once(kind).await {
            Ok(0) => {}
            Ok(emitted) => tracing::debug!(poll_loop = %kind, emitted, "poll batch complete"),
            Err(e) if e.is_transient() => {
                tracing::debug!(poll_loop = %kind, error = %e, "poll failed, retrying")
            }
            Err(e) => tracing::warn!(poll_loop = %kind, error = %e, "unexpected poll error, retrying"),
        }
        tokio::time::sleep(inner.interval).await;
    }
}

/// The pair of poll loops feeding one event bus.
#[derive(Clone)]
pub struct Pollers {
    inner: Arc<Inner>,
}

impl Pollers {
    pub fn new(engine: Arc<dyn Engine>, seen: SeenSet, bus: EventBus, interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                seen,
                bus,
                interval,
                armed: AtomicBool::new(false),
                blocks: PollState::default(),
                mempool: PollState::default(),
            }),
        }
    }

    /// Note that a subscriber needs `kind`. Starts it right away once armed.
    pub fn demand(&self, kind: LoopKind) {
        self.inner.state(kind).wanted.store(true, Ordering::SeqCst);
        if self.inner.armed.load(Ordering::SeqCst) {
            self.activate(kind);
        }
    }

    /// Allow loops to run (engine started) and start every demanded loop.
    pub fn arm(&self) {
        self.inner.armed.store(true, Ordering::SeqCst);
        for kind in [LoopKind::Blocks, LoopKind::Mempool] {
            if self.inner.state(kind).wanted.load(Ordering::SeqCst) {
                self.activate(kind);
            }
        }
    }

    /// Start the loop unless it already runs. Returns `true` if this call started it.
    /// Must run inside a tokio runtime.
    pub fn activate(&self, kind: LoopKind) -> bool {
        let started = self
            .inner
            .state(kind)
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if started {
            tokio::spawn(poll_forever(self.inner.clone(), kind));
        }
        started
    }

    pub fn is_active(&self, kind: LoopKind) -> bool {
        self.inner.state(kind).active.load(Ordering::SeqCst)
    }

    pub fn is_armed(&self) -> bool {
        self.inner.armed.load(Ordering::SeqCst)
    }
}
