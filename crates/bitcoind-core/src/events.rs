//! Event surface: named node events and their subscribers.
//!
//! Each subscription owns an unbounded channel and a set of event kinds it
//! listens to. A subscription covering several kinds receives them in the
//! exact order they were emitted.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::engine::EngineStatus;
use crate::types::{Block, Transaction};

/// The event names exposed to host applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Engine started.
    Open,
    /// Engine failed to start.
    Error,
    /// A newly confirmed block.
    Block,
    /// Any transaction, confirmed (inside a block) or unconfirmed.
    Tx,
    /// Unconfirmed mempool transaction.
    MempoolTx,
}

impl EventKind {
    /// Wire-style name of the event (`"block"`, `"tx"`, `"mptx"`, ...).
    pub fn name(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Error => "error",
            Self::Block => "block",
            Self::Tx => "tx",
            Self::MempoolTx => "mptx",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "error" => Ok(Self::Error),
            "block" => Ok(Self::Block),
            "tx" => Ok(Self::Tx),
            "mptx" => Ok(Self::MempoolTx),
            other => Err(format!("unknown event: {other}")),
        }
    }
}

/// A single emitted event.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    Open(EngineStatus),
    Error(String),
    Block(Block),
    Tx(Transaction),
    MempoolTx(Transaction),
}

impl NodeEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Open(_) => EventKind::Open,
            Self::Error(_) => EventKind::Error,
            Self::Block(_) => EventKind::Block,
            Self::Tx(_) => EventKind::Tx,
            Self::MempoolTx(_) => EventKind::MempoolTx,
        }
    }

    /// Hash of the carried block or transaction, if any.
    pub fn item_hash(&self) -> Option<&str> {
        match self {
            Self::Block(b) => Some(&b.hash),
            Self::Tx(t) | Self::MempoolTx(t) => Some(&t.hash),
            Self::Open(_) | Self::Error(_) => None,
        }
    }
}

struct Subscriber {
    kinds: HashSet<EventKind>,
    sender: mpsc::UnboundedSender<NodeEvent>,
}

/// Fan-out of node events to subscribers.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for the given kinds.
    pub fn subscribe(
        &self,
        kinds: impl IntoIterator<Item = EventKind>,
    ) -> mpsc::UnboundedReceiver<NodeEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(Subscriber {
            kinds: kinds.into_iter().collect(),
            sender: tx,
        });
        rx
    }

    /// Deliver `event` to every subscriber of its kind.
    ///
    /// Subscribers whose receiver was dropped are pruned.
    pub fn emit(&self, event: NodeEvent) {
        let kind = event.kind();
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|s| {
            if !s.kinds.contains(&kind) {
                return !s.sender.is_closed();
            }
            let delivered = s.sender.send(event.clone()).is_ok();
            if !delivered {
                tracing::trace!(event = %kind, "dropping closed subscriber");
            }
            delivered
        });
    }

    /// Number of live subscribers listening to `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.subscribers
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.kinds.contains(&kind) && !s.sender.is_closed())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_reaches_matching_kind_only() {
        let bus = EventBus::new();
        let mut blocks = bus.subscribe([EventKind::Block]);
        let mut txs = bus.subscribe([EventKind::Tx]);

        bus.emit(NodeEvent::Block(Block::new("b1")));

        assert_eq!(blocks.try_recv().unwrap().item_hash(), Some("b1"));
        assert!(txs.try_recv().is_err());
    }

    #[test]
    fn multi_kind_subscription_preserves_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe([EventKind::Block, EventKind::Tx]);

        bus.emit(NodeEvent::Block(Block::new("b1")));
        bus.emit(NodeEvent::MempoolTx(Transaction::new("ignored")));
        bus.emit(NodeEvent::Tx(Transaction::new("t1")));

        assert_eq!(rx.try_recv().unwrap().kind(), EventKind::Block);
        assert_eq!(rx.try_recv().unwrap().item_hash(), Some("t1"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_subscribers_are_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe([EventKind::Tx]);
        assert_eq!(bus.listener_count(EventKind::Tx), 1);
        drop(rx);
        bus.emit(NodeEvent::Tx(Transaction::new("t1")));
        assert_eq!(bus.listener_count(EventKind::Tx), 0);
    }

    #[test]
    fn event_names_round_trip() {
        for kind in [
            EventKind::Open,
            EventKind::Error,
            EventKind::Block,
            EventKind::Tx,
            EventKind::MempoolTx,
        ] {
            assert_eq!(kind.name().parse::<EventKind>().unwrap(), kind);
        }
        assert!("reorg".parse::<EventKind>().is_err());
    }
}
