//! Optional outcome observers.
//!
//! The broker reports every outcome it produces to its registered observers.
//! [`OutcomeHistory`] is the stock observer: a bounded ring buffer of the most
//! recent outcomes, for status displays and debugging.

use std::{
    collections::VecDeque,
    sync::{Arc, RwLock},
};

use serde::Serialize;

use crate::{
    broker::{ClockFn, now_ms},
    outcome::Outcome,
};

/// Receives every outcome produced by the broker.
///
/// Called synchronously on the broker's task; implementations must not block.
pub trait OutcomeObserver: Send + Sync {
    fn observe(&self, outcome: &Outcome);
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    /// Unix ms, taken from the broker clock.
    pub at_ms: i64,
    pub outcome: Outcome,
}

const DEFAULT_CAPACITY: usize = 100;

/// Bounded in-memory history of recent outcomes. Oldest entries are evicted.
#[derive(Clone)]
pub struct OutcomeHistory {
    buf: Arc<RwLock<VecDeque<HistoryEntry>>>,
    capacity: usize,
    clock: ClockFn,
}

impl Default for OutcomeHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl OutcomeHistory {
    pub fn new(capacity: usize) -> Self {
        Self::with_clock(capacity, Arc::new(now_ms))
    }

    pub fn with_clock(capacity: usize, clock: ClockFn) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
            clock,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest-first copy of the buffered entries.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        let buf = self.buf.read().unwrap_or_else(|e| e.into_inner());
        buf.iter().cloned().collect()
    }

    /// The most recent `limit` entries, newest last.
    pub fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        let buf = self.buf.read().unwrap_or_else(|e| e.into_inner());
        let start = buf.len().saturating_sub(limit);
        buf.iter().skip(start).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.buf.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.buf.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl OutcomeObserver for OutcomeHistory {
    fn observe(&self, outcome: &Outcome) {
        let entry = HistoryEntry {
            at_ms: (self.clock)(),
            outcome: outcome.clone(),
        };
        let mut buf = self.buf.write().unwrap_or_else(|e| e.into_inner());
        if buf.len() >= self.capacity {
            buf.pop_front();
        }
        buf.push_back(entry);
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::outcome::ErrorReason};

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let history = OutcomeHistory::with_clock(2, Arc::new(|| 42));
        history.observe(&Outcome::NoActionTaken);
        history.observe(&Outcome::error(ErrorReason::NotFound));
        history.observe(&Outcome::error(ErrorReason::MissingParty));

        let entries = history.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].outcome, Outcome::error(ErrorReason::NotFound));
        assert_eq!(entries[1].at_ms, 42);
    }

    #[test]
    fn recent_returns_tail() {
        let history = OutcomeHistory::new(10);
        for _ in 0..4 {
            history.observe(&Outcome::NoActionTaken);
        }
        history.observe(&Outcome::error(ErrorReason::NotFound));
        let recent = history.recent(2);
        assert_eq!(recent.len(), 2);
        assert!(recent[1].outcome.is_error());
        assert_eq!(history.recent(50).len(), 5);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let history = OutcomeHistory::new(0);
        assert_eq!(history.capacity(), 1);
        history.observe(&Outcome::NoActionTaken);
        history.clear();
        assert!(history.is_empty());
    }
}
