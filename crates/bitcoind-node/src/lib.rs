//! bitcoind-node: runs a native bitcoind engine inside a host process.
//!
//! # Architecture
//!
//! ```text
//! BitcoinNode
//!     ├── Lifecycle   (watchdog + signal / exit / panic interceptors)
//!     ├── Pollers     (block loop, mempool loop → SeenSet → EventBus)
//!     ├── log pipe    (engine log lines → stdout)
//!     └── NodeLogger  ("bitcoind.js: ..." operational lines + tracing)
//! ```

pub mod builder;
pub mod config;
pub mod intent;
pub mod interceptors;
pub mod lifecycle;
pub mod log_pipe;
pub mod logging;
pub mod node;
pub mod poller;
pub mod process;

pub use builder::NodeBuilder;
pub use config::{LogConfig, NodeConfig};
pub use intent::TerminationIntent;
pub use lifecycle::{Lifecycle, Phase};
pub use logging::{init_tracing, NodeLogger};
pub use node::BitcoinNode;
pub use poller::{LoopKind, Pollers};
pub use process::{ProcessAction, ProcessControl, RecordingProcess, SystemProcess, TerminationSignal};
