//! Logging: tracing initialisation plus the prefixed operational log lines.
//!
//! Operational lines (`bitcoind.js: shutting down...`) go to stdout, errors to
//! stderr. Each line is also mirrored as a `debug` event on the `bitcoind`
//! target. Tracing output itself is written to stderr so it never interleaves
//! with the operational lines on stdout.

use std::fmt::{self, Debug};
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter};

use crate::config::LogConfig;

/// Initialise tracing with the given log config.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing(config: &LogConfig) -> bool {
    let filter = EnvFilter::try_new(config.directives()).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .is_ok()
    }
}

/// Destination of operational lines.
pub type LogSink = Arc<Mutex<dyn Write + Send>>;

/// Writes `"<prefix>: <message>"` lines to an output and an error sink
/// (stdout / stderr unless replaced).
#[derive(Clone)]
pub struct NodeLogger {
    prefix: String,
    out: LogSink,
    err: LogSink,
}

impl Debug for NodeLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeLogger")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl NodeLogger {
    pub fn new(prefix: impl Into<String>) -> Self {
        let out: LogSink = Arc::new(Mutex::new(std::io::stdout()));
        let err: LogSink = Arc::new(Mutex::new(std::io::stderr()));
        Self::with_sinks(prefix, out, err)
    }

    pub fn with_sinks(prefix: impl Into<String>, out: LogSink, err: LogSink) -> Self {
        Self {
            prefix: prefix.into(),
            out,
            err,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn format_line(&self, message: &str) -> String {
        format!("{}: {}\n", self.prefix, message)
    }

    /// Pretty-printed rendering of a non-string value.
    pub fn inspect<T: Debug + ?Sized>(value: &T) -> String {
        format!("{value:#?}")
    }

    fn write_line(&self, sink: &LogSink, message: &str) {
        let mut sink = sink.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = sink.write_all(self.format_line(message).as_bytes());
        let _ = sink.flush();
    }

    pub fn log(&self, message: &str) {
        tracing::debug!(target: "bitcoind", "{message}");
        self.write_line(&self.out, message);
    }

    /// Alias of [`NodeLogger::log`].
    pub fn info(&self, message: &str) {
        self.log(message);
    }

    pub fn log_value<T: Debug + ?Sized>(&self, value: &T) {
        self.log(&Self::inspect(value));
    }

    pub fn error(&self, message: &str) {
        tracing::debug!(target: "bitcoind", error = true, "{message}");
        self.write_line(&self.err, message);
    }

    pub fn error_value<T: Debug + ?Sized>(&self, value: &T) {
        self.error(&Self::inspect(value));
    }
}
