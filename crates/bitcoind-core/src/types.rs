//! Block and transaction snapshots returned by the engine.
//!
//! These are plain data containers. Consensus-level behaviour (serialization,
//! hashing, validation) stays inside the engine.

use serde::{Deserialize, Serialize};

// ─── Block ────────────────────────────────────────────────────────────────────

/// A confirmed block as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block hash (hex, display byte order).
    pub hash: String,
    /// Height in the active chain.
    #[serde(default)]
    pub height: u64,
    /// Hash of the parent block.
    #[serde(default)]
    pub previous_hash: String,
    /// Block header timestamp (seconds since epoch).
    #[serde(default)]
    pub time: i64,
    /// Contained transactions, in block order.
    #[serde(default)]
    pub tx: Vec<Transaction>,
}

impl Block {
    /// Create an empty block with the given hash.
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            height: 0,
            previous_hash: String::new(),
            time: 0,
            tx: Vec::new(),
        }
    }

    /// Append a transaction.
    pub fn with_tx(mut self, tx: Transaction) -> Self {
        self.tx.push(tx);
        self
    }

    /// Set the height.
    pub fn at_height(mut self, height: u64) -> Self {
        self.height = height;
        self
    }
}

// ─── Transaction ──────────────────────────────────────────────────────────────

/// A reference to a previous output being spent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub prev_hash: String,
    pub prev_index: u32,
    #[serde(default)]
    pub script_sig: String,
    #[serde(default = "default_sequence")]
    pub sequence: u32,
}

fn default_sequence() -> u32 {
    u32::MAX
}

/// A newly created output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Value in satoshis.
    pub value: u64,
    #[serde(default)]
    pub script_pubkey: String,
}

/// A transaction snapshot, confirmed or still in the mempool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction id (hex, display byte order).
    pub hash: String,
    /// Minimum fee policy, in satoshis.
    #[serde(default)]
    pub min_tx_fee: u64,
    /// Minimum relay fee policy, in satoshis.
    #[serde(default)]
    pub min_relay_tx_fee: u64,
    /// `-1` when the engine did not report a version.
    #[serde(default = "default_version")]
    pub version: i32,
    #[serde(default)]
    pub vin: Vec<TxInput>,
    #[serde(default)]
    pub vout: Vec<TxOutput>,
    #[serde(default)]
    pub lock_time: Option<u32>,
}

fn default_version() -> i32 {
    -1
}

impl Transaction {
    /// Version emitted by current engines.
    pub const CURRENT_VERSION: i32 = 1;

    /// Create a transaction with default policy fields and no inputs/outputs.
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            min_tx_fee: 0,
            min_relay_tx_fee: 0,
            version: default_version(),
            vin: Vec::new(),
            vout: Vec::new(),
            lock_time: None,
        }
    }

    /// Sum of all output values, saturating on overflow.
    pub fn value_out(&self) -> u64 {
        self.vout.iter().fold(0u64, |acc, o| acc.saturating_add(o.value))
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
