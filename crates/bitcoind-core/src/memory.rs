//! In-memory engine.
//!
//! Serves scripted poll batches and lookups from RAM and simulates the engine's
//! asynchronous shutdown. Useful for tests and for embedding the node without a
//! native bitcoind build.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::engine::{Engine, EngineStatus, LogPipe};
use crate::error::NodeError;
use crate::types::{Block, Transaction};

/// Scriptable in-memory engine.
///
/// Poll calls pop the next scripted batch; an empty script yields an empty
/// batch. After `stop`, `is_stopped` turns true once it has been queried
/// `stop_lag` times.
#[derive(Default)]
pub struct MemoryEngine {
    block_batches: Mutex<VecDeque<Result<Vec<Block>, NodeError>>>,
    mempool_batches: Mutex<VecDeque<Result<Vec<Transaction>, NodeError>>>,
    blocks: Mutex<HashMap<String, Block>>,
    txs: Mutex<HashMap<String, Transaction>>,
    start_error: Option<String>,
    stop_error: Option<String>,
    log_output: Mutex<Option<Vec<u8>>>,
    start_params: Mutex<Option<serde_json::Value>>,
    stop_lag: AtomicU32,
    stopping: AtomicBool,
    stopped: AtomicBool,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    block_polls: AtomicUsize,
    mempool_polls: AtomicUsize,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `start` fail with the given reason.
    pub fn with_start_error(mut self, reason: impl Into<String>) -> Self {
        self.start_error = Some(reason.into());
        self
    }

    /// Make `stop` fail with the given reason.
    pub fn with_stop_error(mut self, reason: impl Into<String>) -> Self {
        self.stop_error = Some(reason.into());
        self
    }

    /// Number of `is_stopped` queries answered `false` after `stop` was called.
    pub fn with_stop_lag(self, polls: u32) -> Self {
        self.stop_lag.store(polls, Ordering::SeqCst);
        self
    }

    /// Bytes served through the engine's log pipe.
    pub fn with_log_output(self, bytes: impl Into<Vec<u8>>) -> Self {
        *self.log_output.lock().unwrap() = Some(bytes.into());
        self
    }

    /// Make a block (and its transactions) available to lookups.
    pub fn with_block(self, block: Block) -> Self {
        self.index_block(&block);
        self
    }

    /// Queue a successful block poll result.
    pub fn push_blocks(&self, blocks: Vec<Block>) {
        for block in &blocks {
            self.index_block(block);
        }
        self.block_batches.lock().unwrap().push_back(Ok(blocks));
    }

    /// Queue a failing block poll.
    pub fn push_block_error(&self, reason: impl Into<String>) {
        self.block_batches
            .lock()
            .unwrap()
            .push_back(Err(NodeError::Poll(reason.into())));
    }

    /// Queue a successful mempool poll result.
    pub fn push_mempool(&self, txs: Vec<Transaction>) {
        {
            let mut known = self.txs.lock().unwrap();
            for tx in &txs {
                known.insert(tx.hash.clone(), tx.clone());
            }
        }
        self.mempool_batches.lock().unwrap().push_back(Ok(txs));
    }

    /// Queue a failing mempool poll.
    pub fn push_mempool_error(&self, reason: impl Into<String>) {
        self.mempool_batches
            .lock()
            .unwrap()
            .push_back(Err(NodeError::Poll(reason.into())));
    }

    /// Simulate the engine shutting itself down without a stop request.
    pub fn halt(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Parameters received by the last `start` call.
    pub fn start_params(&self) -> Option<serde_json::Value> {
        self.start_params.lock().unwrap().clone()
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn block_polls(&self) -> usize {
        self.block_polls.load(Ordering::SeqCst)
    }

    pub fn mempool_polls(&self) -> usize {
        self.mempool_polls.load(Ordering::SeqCst)
    }

    fn index_block(&self, block: &Block) {
        let mut txs = self.txs.lock().unwrap();
        for tx in &block.tx {
            txs.insert(tx.hash.clone(), tx.clone());
        }
        self.blocks
            .lock()
            .unwrap()
            .insert(block.hash.clone(), block.clone());
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    async fn start(&self, params: &serde_json::Value) -> Result<EngineStatus, NodeError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        *self.start_params.lock().unwrap() = Some(params.clone());
        if let Some(reason) = &self.start_error {
            self.halt();
            return Err(NodeError::StartFailed(reason.clone()));
        }
        Ok(EngineStatus::new("bitcoind: started"))
    }

    async fn stop(&self) -> Result<EngineStatus, NodeError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = &self.stop_error {
            return Err(NodeError::StopFailed(reason.clone()));
        }
        self.stopping.store(true, Ordering::SeqCst);
        Ok(EngineStatus::new("bitcoind: shutdown requested"))
    }

    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    fn is_stopped(&self) -> bool {
        if self.stopped.load(Ordering::SeqCst) {
            return true;
        }
        if !self.stopping.load(Ordering::SeqCst) {
            return false;
        }
        let lagging = self
            .stop_lag
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if lagging {
            return false;
        }
        self.stopped.store(true, Ordering::SeqCst);
        true
    }

    async fn poll_blocks(&self) -> Result<Vec<Block>, NodeError> {
        self.block_polls.fetch_add(1, Ordering::SeqCst);
        self.block_batches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn poll_mempool(&self) -> Result<Vec<Transaction>, NodeError> {
        self.mempool_polls.fetch_add(1, Ordering::SeqCst);
        self.mempool_batches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn get_block(&self, hash: &str) -> Result<Block, NodeError> {
        self.blocks
            .lock()
            .unwrap()
            .get(hash)
            .cloned()
            .ok_or_else(|| NodeError::BlockNotFound { hash: hash.into() })
    }

    async fn get_transaction(
        &self,
        tx_hash: &str,
        block_hash: Option<&str>,
    ) -> Result<Transaction, NodeError> {
        let not_found = || NodeError::TxNotFound {
            hash: tx_hash.into(),
        };
        match block_hash.filter(|h| !h.is_empty()) {
            Some(block_hash) => self
                .blocks
                .lock()
                .unwrap()
                .get(block_hash)
                .and_then(|b| b.tx.iter().find(|t| t.hash == tx_hash).cloned())
                .ok_or_else(not_found),
            None => self
                .txs
                .lock()
                .unwrap()
                .get(tx_hash)
                .cloned()
                .ok_or_else(not_found),
        }
    }

    fn log_pipe(&self) -> Option<LogPipe> {
        let bytes = self.log_output.lock().unwrap().take()?;
        Some(Box::new(std::io::Cursor::new(bytes)))
    }
}
