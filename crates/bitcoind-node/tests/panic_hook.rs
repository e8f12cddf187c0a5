//! Panics count as failures only when they escape a supervised scope.

use std::sync::Arc;
use std::time::Duration;

use bitcoind_core::{Engine, MemoryEngine, NodeError};
use bitcoind_node::{BitcoinNode, NodeBuilder, ProcessAction, RecordingProcess, TerminationIntent};

fn started_node(engine: Arc<MemoryEngine>) -> (BitcoinNode, Arc<RecordingProcess>) {
    let process = Arc::new(RecordingProcess::new());
    let config = NodeBuilder::new()
        .watchdog_interval_ms(15)
        .intercept_signals(false)
        .intercept_panics(true)
        .build_config();
    (BitcoinNode::with_process(config, engine, process.clone()), process)
}

async fn crash(message: &'static str) -> u32 {
    panic!("{message}")
}

#[tokio::test]
async fn handled_panics_leave_the_engine_running() {
    let engine = Arc::new(MemoryEngine::new());
    let (node, process) = started_node(engine.clone());
    node.start().await.unwrap();

    let caught = std::panic::catch_unwind(|| panic!("handled locally"));
    assert!(caught.is_err());
    let joined = tokio::spawn(async { panic!("join error handled") }).await;
    assert!(joined.is_err());

    // A supervised body that catches its own panic is fine too.
    let inner = node
        .run(async { std::panic::catch_unwind(|| panic!("caught inside run")).is_err() })
        .await;
    assert!(matches!(inner, Ok(true)));

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(node.lifecycle().intent(), TerminationIntent::None);
    assert_eq!(engine.stop_calls(), 0);
    assert!(process.actions().is_empty());
}

#[tokio::test]
async fn panic_escaping_run_stops_engine_before_exit() {
    let engine = Arc::new(MemoryEngine::new().with_stop_lag(2));
    let (node, process) = started_node(engine.clone());
    node.start().await.unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(3), node.run(crash("handler exploded")))
        .await
        .expect("run never returned");

    // run only returns once the final action was taken
    assert_eq!(process.actions(), vec![ProcessAction::Exit(1)]);
    assert!(engine.is_stopped());
    assert_eq!(engine.stop_calls(), 1);
    match outcome {
        Err(NodeError::Other(message)) => {
            assert!(message.contains("handler exploded"));
            assert!(message.contains("panic_hook.rs"), "location missing: {message}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn panic_in_supervised_task_is_a_failure() {
    let engine = Arc::new(MemoryEngine::new().with_stop_lag(1));
    let (node, process) = started_node(engine.clone());
    node.start().await.unwrap();

    let task = node.spawn(crash("worker died"));

    let action = tokio::time::timeout(Duration::from_secs(3), process.first_action())
        .await
        .unwrap();
    assert_eq!(action, ProcessAction::Exit(1));
    assert_eq!(task.await.unwrap(), None);
    assert_eq!(engine.stop_calls(), 1);
}

#[tokio::test]
async fn panic_before_start_exits_immediately() {
    let engine = Arc::new(MemoryEngine::new());
    let (node, process) = started_node(engine.clone());

    let outcome = node.run(crash("config invalid")).await;

    assert!(matches!(outcome, Err(NodeError::Other(_))));
    assert_eq!(process.actions(), vec![ProcessAction::Exit(1)]);
    assert_eq!(engine.stop_calls(), 0);
}
