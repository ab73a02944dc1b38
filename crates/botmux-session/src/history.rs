//! Bounded per-session conversation history.

use std::collections::VecDeque;

use botmux_protocol::{Message, Segment};
use chrono::{DateTime, Utc};

/// One turn of a group conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryEntry {
    /// A message received from the group.
    Inbound(Message),
    /// A reply the bot successfully posted.
    Outbound {
        content: Vec<Segment>,
        sent_at: DateTime<Utc>,
    },
}

/// A FIFO buffer holding at most `capacity` entries.
///
/// Pushing onto a full buffer evicts the oldest entry. A capacity of zero
/// disables history entirely.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    capacity: usize,
    entries: VecDeque<HistoryEntry>,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// A copy of the current entries, oldest first.
    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }
}
