//! Fluent builder API for node configuration.
//!
//! # Example
//!
//! ```rust,no_run
//! use bitcoind_node::NodeBuilder;
//!
//! let config = NodeBuilder::new()
//!     .engine_params(serde_json::json!({ "datadir": "/var/lib/bitcoind" }))
//!     .poll_interval_ms(500)
//!     .intercept_panics(false)
//!     .build_config();
//! ```

use crate::config::{LogConfig, NodeConfig};

/// Fluent builder for `NodeConfig`.
#[derive(Default)]
pub struct NodeBuilder {
    config: NodeConfig,
}

impl NodeBuilder {
    pub fn new() -> Self {
        Self {
            config: NodeConfig::default(),
        }
    }

    /// Set the opaque engine startup parameters.
    pub fn engine_params(mut self, params: serde_json::Value) -> Self {
        self.config.engine = params;
        self
    }

    /// Set the poll loop interval / retry backoff in milliseconds.
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// Set the shutdown watchdog period in milliseconds.
    pub fn watchdog_interval_ms(mut self, ms: u64) -> Self {
        self.config.watchdog_interval_ms = ms;
        self
    }

    pub fn log_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.log_prefix = prefix.into();
        self
    }

    pub fn pipe_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.pipe_prefix = prefix.into();
        self
    }

    /// Enable or disable the SIGINT / SIGHUP / SIGQUIT interceptors.
    pub fn intercept_signals(mut self, on: bool) -> Self {
        self.config.intercept_signals = on;
        self
    }

    /// Supervise panics escaping `BitcoinNode::run` / `BitcoinNode::spawn`.
    pub fn intercept_panics(mut self, on: bool) -> Self {
        self.config.intercept_panics = on;
        self
    }

    pub fn log(mut self, log: LogConfig) -> Self {
        self.config.log = log;
        self
    }

    /// Build the `NodeConfig`.
    pub fn build_config(self) -> NodeConfig {
        self.config
    }
}
