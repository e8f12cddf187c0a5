//! Dedup registry: remembers every block and transaction hash already emitted.
//!
//! The set only grows. It is scoped to one node instance, so it lives exactly as
//! long as the process that embeds the engine.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Append-only set of emitted item identifiers, shared by both poll loops.
#[derive(Clone, Default)]
pub struct SeenSet {
    ids: Arc<Mutex<HashSet<String>>>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `id` was already marked.
    pub fn has_seen(&self, id: &str) -> bool {
        self.ids.lock().unwrap().contains(id)
    }

    /// Mark `id` as emitted. Marking twice is a no-op.
    pub fn mark_seen(&self, id: &str) {
        self.insert(id);
    }

    /// Check and mark in one step. Returns `true` if `id` was not seen before.
    pub fn insert(&self, id: &str) -> bool {
        let mut ids = self.ids.lock().unwrap();
        if ids.contains(id) {
            return false;
        }
        ids.insert(id.to_string())
    }

    pub fn len(&self) -> usize {
        self.ids.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
