//! Real signal delivery through the installed interceptors.
//!
//! Kept as the only test in this binary: signal dispositions are process-wide.

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use bitcoind_core::MemoryEngine;
use bitcoind_node::interceptors::Claim;
use bitcoind_node::{
    BitcoinNode, NodeBuilder, ProcessAction, RecordingProcess, TerminationIntent,
    TerminationSignal,
};

#[tokio::test]
async fn sighup_is_deferred_then_re_raised() {
    let engine = Arc::new(MemoryEngine::new().with_stop_lag(2));
    let process = Arc::new(RecordingProcess::new());
    let config = NodeBuilder::new()
        .watchdog_interval_ms(15)
        .intercept_signals(true)
        .intercept_panics(false)
        .build_config();
    let node = BitcoinNode::with_process(config, engine.clone(), process.clone());
    node.start().await.unwrap();

    assert_eq!(node.lifecycle().intercepted_signals(), 3);
    let hangup = TerminationSignal::Hangup;
    assert!(Claim::is_claimed(hangup));

    signal_hook::low_level::raise(signal_hook::consts::SIGHUP).unwrap();

    let action = tokio::time::timeout(Duration::from_secs(3), process.first_action())
        .await
        .unwrap();
    assert_eq!(action, ProcessAction::Raise(TerminationSignal::Hangup));
    assert_eq!(node.lifecycle().intent(), TerminationIntent::None);
    assert_eq!(engine.stop_calls(), 1);

    // Own interceptor for the re-raised signal is released, the others stay.
    assert!(!Claim::is_claimed(hangup));
    assert_eq!(node.lifecycle().intercepted_signals(), 2);
}
