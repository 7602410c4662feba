//! Bounded message history ring
//!
//! Insertion-ordered buffer of the last N chat/system events, shared by
//! the message router. Appends evict the oldest entry at capacity; reads
//! return independent snapshots so callers may iterate while the ring
//! keeps mutating.

use std::collections::VecDeque;

use crate::types::ChatEvent;

/// Default number of retained events
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Bounded, insertion-ordered event buffer
#[derive(Debug)]
pub struct HistoryRing {
    events: VecDeque<ChatEvent>,
    capacity: usize,
}

impl HistoryRing {
    /// Create a ring retaining at most `capacity` events
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an event, evicting the oldest entries at capacity
    ///
    /// A zero-capacity ring retains nothing.
    pub fn append(&mut self, event: ChatEvent) {
        if self.capacity == 0 {
            return;
        }
        while self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// The last `n` events, oldest first (fewer if the ring holds fewer)
    pub fn last_n(&self, n: usize) -> Vec<ChatEvent> {
        let skip = self.events.len().saturating_sub(n);
        self.events.iter().skip(skip).cloned().collect()
    }

    /// Full ordered snapshot
    pub fn all(&self) -> Vec<ChatEvent> {
        self.events.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for HistoryRing {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
