use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A single recorded probe failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Unix timestamp millis
    pub observed_at: u64,
    pub message: String,
}

impl ErrorRecord {
    pub fn new(observed_at: u64, message: impl Into<String>) -> Self {
        Self {
            observed_at,
            message: message.into(),
        }
    }
}

/// Fixed-capacity log of recent failures, oldest evicted first
#[derive(Debug, Clone)]
pub struct ErrorHistory {
    capacity: usize,
    // Front is the most recent record
    entries: VecDeque<ErrorRecord>,
}

impl ErrorHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn append(&mut self, record: ErrorRecord) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front(record);
    }

    /// Copy of the history, most recent first
    pub fn snapshot(&self) -> Vec<ErrorRecord> {
        self.entries.iter().cloned().collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_is_most_recent_first() {
        let mut history = ErrorHistory::new(10);
        history.append(ErrorRecord::new(1, "first"));
        history.append(ErrorRecord::new(2, "second"));
        history.append(ErrorRecord::new(3, "third"));

        let messages: Vec<String> = history.snapshot().into_iter().map(|r| r.message).collect();
        assert_eq!(messages, vec!["third", "second", "first"]);
    }

    #[test]
    fn test_eviction_past_capacity() {
        let mut history = ErrorHistory::new(10);
        for i in 1..=11u64 {
            history.append(ErrorRecord::new(i, format!("error {}", i)));
        }

        let snapshot = history.snapshot();
        assert_eq!(snapshot.len(), 10);
        assert_eq!(snapshot[0].message, "error 11");
        assert_eq!(snapshot[9].message, "error 2");
        assert!(!snapshot.iter().any(|r| r.message == "error 1"));
    }

    #[test]
    fn test_length_never_exceeds_capacity() {
        let mut history = ErrorHistory::new(3);
        for i in 0..50u64 {
            history.append(ErrorRecord::new(i, "boom"));
            assert!(history.len() <= history.capacity());
        }
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut history = ErrorHistory::new(0);
        history.append(ErrorRecord::new(1, "dropped"));
        assert!(history.is_empty());
        assert!(history.snapshot().is_empty());
    }
}
