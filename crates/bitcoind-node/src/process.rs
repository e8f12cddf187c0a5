//! Process-level termination primitives.
//!
//! The coordinator never calls `std::process::exit` or raises a signal itself;
//! it goes through [`ProcessControl`] so the final action can be observed in
//! tests.

use std::sync::Mutex;

use tokio::sync::Notify;

/// Termination signals intercepted while the engine is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationSignal {
    Interrupt,
    Hangup,
    Quit,
}

impl TerminationSignal {
    pub const ALL: [TerminationSignal; 3] = [Self::Interrupt, Self::Hangup, Self::Quit];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Hangup => "SIGHUP",
            Self::Quit => "SIGQUIT",
        }
    }

    #[cfg(unix)]
    pub fn raw(&self) -> i32 {
        match self {
            Self::Interrupt => signal_hook::consts::SIGINT,
            Self::Hangup => signal_hook::consts::SIGHUP,
            Self::Quit => signal_hook::consts::SIGQUIT,
        }
    }

    /// Conventional shell exit status for a process killed by this signal.
    pub fn exit_status(&self) -> i32 {
        match self {
            Self::Hangup => 129,
            Self::Interrupt => 130,
            Self::Quit => 131,
        }
    }
}

impl std::fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The real process-ending primitives.
pub trait ProcessControl: Send + Sync + 'static {
    /// Terminate the process with `code`.
    fn exit(&self, code: i32);

    /// Deliver `signal` to the process with its default disposition restored.
    fn raise(&self, signal: TerminationSignal);
}

/// Terminates the current OS process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcess;

impl ProcessControl for SystemProcess {
    fn exit(&self, code: i32) {
        std::process::exit(code);
    }

    #[cfg(unix)]
    fn raise(&self, signal: TerminationSignal) {
        if let Err(e) = signal_hook::low_level::emulate_default_handler(signal.raw()) {
            tracing::error!(signal = %signal, error = %e, "re-raise failed, exiting");
        }
        std::process::exit(signal.exit_status());
    }

    #[cfg(not(unix))]
    fn raise(&self, signal: TerminationSignal) {
        std::process::exit(signal.exit_status());
    }
}

/// A final action requested from [`ProcessControl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessAction {
    Exit(i32),
    Raise(TerminationSignal),
}

/// Records requested actions instead of terminating. For tests.
#[derive(Default)]
pub struct RecordingProcess {
    actions: Mutex<Vec<ProcessAction>>,
    notify: Notify,
}

impl RecordingProcess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> Vec<ProcessAction> {
        self.actions.lock().unwrap().clone()
    }

    /// Wait until at least one action has been recorded and return the first.
    pub async fn first_action(&self) -> ProcessAction {
        loop {
            let notified = self.notify.notified();
            if let Some(first) = self.actions.lock().unwrap().first().copied() {
                return first;
            }
            notified.await;
        }
    }

    fn record(&self, action: ProcessAction) {
        self.actions.lock().unwrap().push(action);
        self.notify.notify_waiters();
    }
}

impl ProcessControl for RecordingProcess {
    fn exit(&self, code: i32) {
        self.record(ProcessAction::Exit(code));
    }

    fn raise(&self, signal: TerminationSignal) {
        self.record(ProcessAction::Raise(signal));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn signal_names() {
        let names: Vec<_> = TerminationSignal::ALL.iter().map(|s| s.name()).collect();
        assert_eq!(names, ["SIGINT", "SIGHUP", "SIGQUIT"]);
        assert_eq!(TerminationSignal::Interrupt.exit_status(), 130);
    }

    #[cfg(unix)]
    #[test]
    fn raw_numbers_match_posix() {
        assert_eq!(TerminationSignal::Interrupt.raw(), 2);
        assert_eq!(TerminationSignal::Hangup.raw(), 1);
        assert_eq!(TerminationSignal::Quit.raw(), 3);
    }

    #[tokio::test]
    async fn recording_process_wakes_waiter() {
        let process = Arc::new(RecordingProcess::new());
        let waiter = {
            let process = process.clone();
            tokio::spawn(async move { process.first_action().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        process.raise(TerminationSignal::Hangup);
        process.exit(0);

        let first = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, ProcessAction::Raise(TerminationSignal::Hangup));
        assert_eq!(process.actions().len(), 2);
    }
}
