//! Bounded send/receive timestamp bookkeeping.

use std::collections::VecDeque;

use tokio::time::Instant;

/// Number of message-ids remembered per direction.
pub const LEDGER_CAPACITY: usize = 20;

/// Timestamps keyed by message-id, oldest evicted first.
///
/// Diagnostic only: a missing entry just means no round-trip figure.
#[derive(Debug)]
pub struct TimestampLedger {
    entries: VecDeque<(String, Instant)>,
    capacity: usize,
}

impl Default for TimestampLedger {
    fn default() -> Self {
        Self::new(LEDGER_CAPACITY)
    }
}

impl TimestampLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Records `at` for `message_id`, replacing an older entry for the same id.
    pub fn record(&mut self, message_id: &str, at: Instant) {
        self.entries.retain(|(id, _)| id != message_id);
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((message_id.to_string(), at));
    }

    pub fn get(&self, message_id: &str) -> Option<Instant> {
        self.entries
            .iter()
            .find(|(id, _)| id == message_id)
            .map(|(_, at)| *at)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let mut ledger = TimestampLedger::default();
        let start = Instant::now();
        for i in 0..25u64 {
            ledger.record(&i.to_string(), start + Duration::from_millis(i));
        }
        assert_eq!(ledger.len(), LEDGER_CAPACITY);
        assert!(ledger.get("4").is_none());
        assert_eq!(ledger.get("5"), Some(start + Duration::from_millis(5)));
        assert_eq!(ledger.get("24"), Some(start + Duration::from_millis(24)));
    }

    #[test]
    fn rerecording_an_id_keeps_one_entry() {
        let mut ledger = TimestampLedger::new(2);
        let start = Instant::now();
        ledger.record("1", start);
        ledger.record("1", start + Duration::from_secs(1));
        ledger.record("2", start);
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.get("1"), Some(start + Duration::from_secs(1)));
    }
}
