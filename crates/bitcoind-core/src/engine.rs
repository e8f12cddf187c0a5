//! The engine contract: the native bitcoind process this crate coordinates.
//!
//! The engine is opaque: it runs its own threads, and the bridge only ever
//! observes it through these calls. `is_stopping` / `is_stopped` are cheap
//! synchronous flag reads; everything else may suspend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::NodeError;
use crate::types::{Block, Transaction};

/// Readable side of the engine's log pipe.
pub type LogPipe = Box<dyn tokio::io::AsyncRead + Send + Unpin>;

/// Status message reported by the engine on start/stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub message: String,
}

impl EngineStatus {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Operations exposed by the native engine.
#[async_trait]
pub trait Engine: Send + Sync + 'static {
    /// Boot the engine. `params` is passed through untouched from the node config.
    async fn start(&self, params: &serde_json::Value) -> Result<EngineStatus, NodeError>;

    /// Ask the engine to shut down. Completion is observed through `is_stopped`.
    async fn stop(&self) -> Result<EngineStatus, NodeError>;

    /// The engine has begun its shutdown sequence.
    fn is_stopping(&self) -> bool;

    /// The engine has fully shut down; the handle is dead from here on.
    fn is_stopped(&self) -> bool;

    /// Blocks confirmed since the previous call, oldest first.
    async fn poll_blocks(&self) -> Result<Vec<Block>, NodeError>;

    /// Unconfirmed transactions currently known to the mempool.
    async fn poll_mempool(&self) -> Result<Vec<Transaction>, NodeError>;

    async fn get_block(&self, hash: &str) -> Result<Block, NodeError>;

    /// Look up a transaction, optionally scoped to the block that contains it.
    async fn get_transaction(
        &self,
        tx_hash: &str,
        block_hash: Option<&str>,
    ) -> Result<Transaction, NodeError>;

    /// Take the engine's log pipe, if it exposes one. Called once at start.
    fn log_pipe(&self) -> Option<LogPipe> {
        None
    }
}
