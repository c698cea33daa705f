//! Change history.
//!
//! A bounded FIFO of the most recent value changes made through a proxy.
//! Reads and no-op writes never produce entries.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::value::Value;

/// One recorded change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub field: String,
    pub old: Value,
    pub new: Value,
    /// Position of this change among all changes made through the proxy,
    /// starting at 1. Keeps counting across evictions and clears.
    pub seq: u64,
}

#[derive(Debug)]
pub(crate) struct History {
    entries: VecDeque<ChangeRecord>,
    capacity: usize,
    next_seq: u64,
}

impl History {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            next_seq: 1,
        }
    }

    /// Record a change, evicting the oldest entries beyond capacity.
    pub(crate) fn push(&mut self, field: &str, old: Value, new: Value) {
        let seq = self.next_seq;
        self.next_seq += 1;

        if self.capacity == 0 {
            return;
        }
        self.entries.push_back(ChangeRecord {
            field: field.to_owned(),
            old,
            new,
            seq,
        });
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Entries in chronological order.
    pub(crate) fn entries(&self) -> Vec<ChangeRecord> {
        self.entries.iter().cloned().collect()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }
}
