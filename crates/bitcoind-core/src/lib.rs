//! bitcoind-core: foundation types for driving an embedded bitcoind engine.
//!
//! # Architecture
//!
//! ```text
//! BitcoinNode (bitcoind-node)
//!     ├── Engine          (opaque native engine: start/stop/poll/lookup)
//!     ├── SeenSet         (dedup registry for emitted block/tx hashes)
//!     ├── EventBus        (open / error / block / tx / mptx subscriptions)
//!     └── Block / Transaction containers
//! ```

pub mod dedup;
pub mod engine;
pub mod error;
pub mod events;
pub mod memory;
pub mod types;
pub mod utils;

pub use dedup::SeenSet;
pub use engine::{Engine, EngineStatus, LogPipe};
pub use error::NodeError;
pub use events::{EventBus, EventKind, NodeEvent};
pub use memory::MemoryEngine;
pub use types::{Block, Transaction, TxInput, TxOutput};
pub use utils::rev_hex;
