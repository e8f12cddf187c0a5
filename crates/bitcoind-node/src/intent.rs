//! Termination intent: what the process should do once the engine has stopped.

use crate::process::TerminationSignal;

/// The recorded cause of a deferred termination.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TerminationIntent {
    /// Nothing requested; the engine stopped on its own or through `stop()`.
    #[default]
    None,
    /// Re-deliver this signal.
    Signal(TerminationSignal),
    /// Exit with this code.
    ExitCode(i32),
    /// Report this failure and exit non-zero.
    Failure(String),
}

impl TerminationIntent {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Record `intent` unless one is already held. Returns `true` if recorded.
    pub fn record(&mut self, intent: TerminationIntent) -> bool {
        if !self.is_none() || intent.is_none() {
            return false;
        }
        *self = intent;
        true
    }
}

impl std::fmt::Display for TerminationIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Signal(sig) => write!(f, "signal {sig}"),
            Self::ExitCode(code) => write!(f, "exit code {code}"),
            Self::Failure(err) => write!(f, "failure: {err}"),
        }
    }
}
