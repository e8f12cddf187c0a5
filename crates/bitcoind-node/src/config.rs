//! Node configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a [`crate::BitcoinNode`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Engine startup parameters, handed to `Engine::start` untouched.
    pub engine: serde_json::Value,
    /// Delay between two polls of the same loop, and the retry backoff (ms).
    pub poll_interval_ms: u64,
    /// Period of the shutdown watchdog (ms).
    pub watchdog_interval_ms: u64,
    /// Prefix of operational log lines (`"<prefix>: message"`).
    pub log_prefix: String,
    /// Prefix of lines forwarded from the engine's log pipe.
    pub pipe_prefix: String,
    /// Install SIGINT / SIGHUP / SIGQUIT interceptors on start.
    pub intercept_signals: bool,
    /// Treat panics escaping `BitcoinNode::run` / `BitcoinNode::spawn` as
    /// uncaught failures (and install the message hook on start).
    pub intercept_panics: bool,
    /// Structured logging setup, see [`crate::logging::init_tracing`].
    pub log: LogConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            engine: serde_json::Value::Object(Default::default()),
            poll_interval_ms: 300,
            watchdog_interval_ms: 1000,
            log_prefix: "bitcoind.js".into(),
            pipe_prefix: "bitcoind".into(),
            intercept_signals: true,
            intercept_panics: true,
            log: LogConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms)
    }
}

/// `tracing` filter for the node.
///
/// The default keeps third-party crates at `warn` and this workspace's crates
/// at `info`. Operational lines are printed regardless of this filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Base level for every target.
    pub level: String,
    /// Per-target levels, e.g. `bitcoind_node` = `debug`, or `bitcoind` for the
    /// mirrored operational lines. Dashes in crate names are accepted.
    pub components: BTreeMap<String, String>,
    /// JSON lines instead of human-readable text (both on stderr).
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            components: BTreeMap::from([
                ("bitcoind_core".to_string(), "info".to_string()),
                ("bitcoind_node".to_string(), "info".to_string()),
            ]),
            json: false,
        }
    }
}

impl LogConfig {
    /// Set the level of one target.
    pub fn component(mut self, target: impl Into<String>, level: impl Into<String>) -> Self {
        self.components.insert(target.into().replace('-', "_"), level.into());
        self
    }

    /// `EnvFilter` directives, e.g. `"warn,bitcoind_core=info,bitcoind_node=info"`.
    pub fn directives(&self) -> String {
        let mut directives = self.level.clone();
        for (target, level) in &self.components {
            directives.push_str(&format!(",{}={}", target.replace('-', "_"), level));
        }
        directives
    }
}
