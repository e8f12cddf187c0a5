//! Process-wide trigger interceptors.
//!
//! Every termination signal has a single registration slot for the whole
//! process. A coordinator that finds a slot taken leaves the existing
//! interceptor in charge and installs nothing for that signal.
//!
//! Panics are not intercepted here. A panic only becomes a failure when it
//! escapes a supervised scope (`BitcoinNode::run` / `BitcoinNode::spawn`);
//! panics caught below that scope never reach the coordinator. The process
//! panic hook installed here only remembers the rendered message so the
//! supervised scope can report it with its location.

use std::any::Any;
use std::cell::RefCell;
use std::panic;
use std::sync::{Mutex, Once, PoisonError};

use tokio::task::JoinHandle;

use crate::lifecycle::WeakLifecycle;
use crate::process::TerminationSignal;

static CLAIMS: Mutex<Vec<TerminationSignal>> = Mutex::new(Vec::new());

/// Ownership of a signal slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct Claim {
    signal: TerminationSignal,
}

impl Claim {
    /// Take the slot for `signal`, or `None` if another owner holds it.
    pub fn acquire(signal: TerminationSignal) -> Option<Self> {
        let mut claims = CLAIMS.lock().unwrap_or_else(PoisonError::into_inner);
        if claims.contains(&signal) {
            return None;
        }
        claims.push(signal);
        Some(Self { signal })
    }

    pub fn is_claimed(signal: TerminationSignal) -> bool {
        CLAIMS
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&signal)
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        CLAIMS
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|s| *s != self.signal);
    }
}

// ─── Signals ──────────────────────────────────────────────────────────────────

/// A running signal listener. Dropping it stops listening and frees the slot.
pub struct SignalGuard {
    _claim: Claim,
    task: JoinHandle<()>,
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Listen for `signal` and route every delivery to the coordinator.
///
/// Returns `Ok(None)` when another owner already intercepts this signal, or
/// when the platform cannot deliver it.
pub fn intercept_signal(
    signal: TerminationSignal,
    lifecycle: WeakLifecycle,
) -> std::io::Result<Option<SignalGuard>> {
    let Some(claim) = Claim::acquire(signal) else {
        tracing::debug!(signal = %signal, "signal already intercepted, deferring");
        return Ok(None);
    };
    let Some(task) = spawn_listener(signal, lifecycle)? else {
        return Ok(None);
    };
    Ok(Some(SignalGuard {
        _claim: claim,
        task,
    }))
}

#[cfg(unix)]
fn spawn_listener(
    signal: TerminationSignal,
    lifecycle: WeakLifecycle,
) -> std::io::Result<Option<JoinHandle<()>>> {
    use tokio::signal::unix::{signal as unix_signal, SignalKind};

    let kind = match signal {
        TerminationSignal::Interrupt => SignalKind::interrupt(),
        TerminationSignal::Hangup => SignalKind::hangup(),
        TerminationSignal::Quit => SignalKind::quit(),
    };
    let mut stream = unix_signal(kind)?;
    Ok(Some(tokio::spawn(async move {
        while stream.recv().await.is_some() {
            tracing::info!(signal = %signal, "notified via signal");
            match lifecycle.upgrade() {
                Some(lifecycle) => lifecycle.on_signal(signal),
                None => break,
            }
        }
    })))
}

#[cfg(not(unix))]
fn spawn_listener(
    signal: TerminationSignal,
    lifecycle: WeakLifecycle,
) -> std::io::Result<Option<JoinHandle<()>>> {
    if signal != TerminationSignal::Interrupt {
        return Ok(None);
    }
    Ok(Some(tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("notified via Ctrl-C");
            match lifecycle.upgrade() {
                Some(lifecycle) => lifecycle.on_signal(signal),
                None => break,
            }
        }
    })))
}

// ─── Panics ───────────────────────────────────────────────────────────────────

static PANIC_HOOK: Once = Once::new();

thread_local! {
    static LAST_PANIC: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Install the message-recording panic hook in front of the previous hook.
/// Runs once per process; later calls are no-ops.
pub fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let _ = LAST_PANIC.try_with(|last| *last.borrow_mut() = Some(info.to_string()));
            previous(info);
        }));
    });
}

/// Render a caught panic payload.
///
/// Prefers the message recorded by the hook on this thread (it carries the
/// location), falling back to the payload itself.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(recorded) = LAST_PANIC.with(|last| last.borrow_mut().take()) {
        return recorded;
    }
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_are_exclusive_until_dropped() {
        // Quit is never claimed by other unit tests in this crate.
        let signal = TerminationSignal::Quit;
        let first = Claim::acquire(signal).expect("slot free");
        assert!(Claim::acquire(signal).is_none());
        assert!(Claim::is_claimed(signal));
        drop(first);
        assert!(!Claim::is_claimed(signal));
        assert!(Claim::acquire(signal).is_some());
    }

    #[test]
    fn payload_message_without_hook_record() {
        let payload: Box<dyn Any + Send> = Box::new("plain str");
        assert_eq!(panic_message(payload.as_ref()), "plain str");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "panic with non-string payload");
    }

    #[test]
    fn hook_records_location_for_caught_panic() {
        install_panic_hook();
        let payload = std::panic::catch_unwind(|| panic!("recorded here")).unwrap_err();
        let message = panic_message(payload.as_ref());
        assert!(message.contains("recorded here"));
        assert!(message.contains("interceptors.rs"));
        // the record is consumed
        assert_eq!(panic_message(payload.as_ref()), "recorded here");
    }
}
