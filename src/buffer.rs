//! Log buffer state machine
//!
//! ```text
//! PENDING ──select──→ IN_FLIGHT ──ok──→ (removed)
//!    ↑                    │
//!    └──── retry+1 ───────┤ failed
//!                         └── retry >= ceiling ──→ (dropped)
//! ```
//!
//! The buffer is plain data; `SyncManager` owns it, serializes access, and
//! persists it after every mutation. FIFO order is preserved throughout.

use crate::dlq;
use crate::types::{BufferedLogEntry, DeliveryState, LogEntry};
use std::collections::{HashSet, VecDeque};

/// What a failed delivery did to the attempted entries
#[derive(Debug, Default)]
pub struct FailedBatch {
    /// Entries that reached the retry ceiling, in FIFO order
    pub dropped: Vec<BufferedLogEntry>,

    /// Highest retry count among attempted entries still buffered
    pub max_retry_count: u32,
}

#[derive(Debug, Clone)]
pub struct LogBuffer {
    entries: VecDeque<BufferedLogEntry>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    /// Rebuild from persisted entries
    ///
    /// Every entry is reset to PENDING. Returns the entries evicted to fit
    /// `capacity`.
    pub fn restore(
        entries: Vec<BufferedLogEntry>,
        capacity: usize,
    ) -> (Self, Vec<BufferedLogEntry>) {
        let mut buffer = Self {
            entries: entries
                .into_iter()
                .map(|mut e| {
                    e.state = DeliveryState::Pending;
                    e
                })
                .collect(),
            capacity,
        };
        let evicted = buffer.enforce_capacity();
        (buffer, evicted)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn pending_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.state == DeliveryState::Pending)
            .count()
    }

    pub fn in_flight_count(&self) -> usize {
        self.entries.len() - self.pending_count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BufferedLogEntry> {
        self.entries.iter()
    }

    /// Owned copy of the entries for persistence
    pub fn snapshot(&self) -> Vec<BufferedLogEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Change the capacity, returning evicted entries
    pub fn set_capacity(&mut self, capacity: usize) -> Vec<BufferedLogEntry> {
        self.capacity = capacity;
        self.enforce_capacity()
    }

    /// Append a PENDING entry, returning evicted entries
    pub fn push(&mut self, log: LogEntry) -> Vec<BufferedLogEntry> {
        self.entries.push_back(BufferedLogEntry::new(log));
        self.enforce_capacity()
    }

    /// Mark the oldest `batch_size` PENDING entries IN_FLIGHT
    pub fn select_batch(&mut self, batch_size: usize) -> Vec<LogEntry> {
        self.entries
            .iter_mut()
            .filter(|e| e.state == DeliveryState::Pending)
            .take(batch_size)
            .map(|e| {
                e.state = DeliveryState::InFlight;
                e.log.clone()
            })
            .collect()
    }

    /// Remove delivered IN_FLIGHT entries; returns how many were removed
    pub fn complete_delivered(&mut self, ids: &[String]) -> usize {
        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let before = self.entries.len();
        self.entries
            .retain(|e| !(e.state == DeliveryState::InFlight && ids.contains(e.log.id.as_str())));
        before - self.entries.len()
    }

    /// Return failed IN_FLIGHT entries to PENDING with one more retry
    ///
    /// Entries whose retry count reaches `retry_ceiling` are removed.
    pub fn complete_failed(&mut self, ids: &[String], retry_ceiling: u32) -> FailedBatch {
        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut outcome = FailedBatch::default();
        let mut kept = VecDeque::with_capacity(self.entries.len());

        for mut entry in self.entries.drain(..) {
            if entry.state != DeliveryState::InFlight || !ids.contains(entry.log.id.as_str()) {
                kept.push_back(entry);
                continue;
            }

            entry.retry_count = entry.retry_count.saturating_add(1);
            entry.state = DeliveryState::Pending;

            if dlq::exceeds_ceiling(entry.retry_count, retry_ceiling) {
                outcome.dropped.push(entry);
            } else {
                outcome.max_retry_count = outcome.max_retry_count.max(entry.retry_count);
                kept.push_back(entry);
            }
        }

        self.entries = kept;
        outcome
    }

    /// Evict until within capacity
    ///
    /// Oldest PENDING entries go first. When only IN_FLIGHT entries remain
    /// over the limit (capacity shrank during a delivery), the oldest of
    /// those go too, and completing their batch later finds nothing to act on.
    fn enforce_capacity(&mut self) -> Vec<BufferedLogEntry> {
        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            let pos = self
                .entries
                .iter()
                .position(|e| e.state == DeliveryState::Pending)
                .unwrap_or(0);
            match self.entries.remove(pos) {
                Some(entry) => evicted.push(entry),
                None => break,
            }
        }
        evicted
    }
}
