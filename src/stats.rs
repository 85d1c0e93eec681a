use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::model::{LogEntry, LogKey, Micros, Outcome, StatsSnapshot};

fn now_micros() -> Micros {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as Micros)
        .unwrap_or_default()
}

/// Success/conflict/release counters plus the append-only booking log.
///
/// Entries are never removed or rewritten; a cancellation appends its own
/// entry. Keys are `(stamp, requester)` where stamps are strictly increasing
/// across the whole log, so two entries can never collide.
pub struct StatsLog {
    booked: AtomicU64,
    conflicts: AtomicU64,
    released: AtomicU64,
    last_stamp: AtomicU64,
    entries: DashMap<LogKey, LogEntry>,
}

impl Default for StatsLog {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsLog {
    pub fn new() -> Self {
        Self {
            booked: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
            released: AtomicU64::new(0),
            last_stamp: AtomicU64::new(0),
            entries: DashMap::new(),
        }
    }

    /// Wall-clock micros, bumped past the previous stamp when the clock
    /// stalls or steps backwards.
    fn next_stamp(&self) -> Micros {
        let now = now_micros();
        let prev = self
            .last_stamp
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        now.max(prev + 1)
    }

    /// Count the outcome and append a log entry for it.
    pub fn record(&self, requester: &str, outcome: Outcome) -> LogEntry {
        match outcome {
            Outcome::Booked { .. } => self.booked.fetch_add(1, Ordering::AcqRel),
            Outcome::Conflict { .. } => self.conflicts.fetch_add(1, Ordering::AcqRel),
            Outcome::Released { .. } => self.released.fetch_add(1, Ordering::AcqRel),
        };
        let key = LogKey {
            stamp: self.next_stamp(),
            requester: requester.to_string(),
        };
        let entry = LogEntry {
            key: key.clone(),
            message: outcome.message(),
            outcome,
        };
        self.entries.insert(key, entry.clone());
        entry
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            booked: self.booked.load(Ordering::Acquire),
            conflicts: self.conflicts.load(Ordering::Acquire),
            released: self.released.load(Ordering::Acquire),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries ordered by stamp.
    pub fn entries(&self) -> Vec<LogEntry> {
        let mut out: Vec<LogEntry> = self.entries.iter().map(|e| e.value().clone()).collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }

    pub fn entries_for(&self, requester: &str) -> Vec<LogEntry> {
        let mut out: Vec<LogEntry> = self
            .entries
            .iter()
            .filter(|e| e.key().requester == requester)
            .map(|e| e.value().clone())
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConflictReason, SeatId};
    use std::collections::HashSet;
    use std::sync::Arc;

    fn booked(seat: u32, who: &str) -> Outcome {
        Outcome::Booked { seat: SeatId(seat), requester: who.into() }
    }

    fn conflict(seat: u32, who: &str) -> Outcome {
        Outcome::Conflict {
            seat: SeatId(seat),
            requester: who.into(),
            reason: ConflictReason::Occupied,
        }
    }

    #[test]
    fn counts_by_outcome() {
        let log = StatsLog::new();
        log.record("User1", booked(0, "User1"));
        log.record("User2", conflict(0, "User2"));
        log.record("User3", conflict(0, "User3"));
        log.record("Cancel", Outcome::Released { seat: SeatId(0) });

        let s = log.snapshot();
        assert_eq!(s, StatsSnapshot { booked: 1, conflicts: 2, released: 1 });
        assert_eq!(s.processed(), 3);
        assert_eq!(log.len(), 4);
    }

    #[test]
    fn entries_are_ordered_and_carry_messages() {
        let log = StatsLog::new();
        log.record("User1", booked(2, "User1"));
        log.record("Cancel", Outcome::Released { seat: SeatId(2) });
        log.record("User1", booked(2, "User1"));

        let entries = log.entries();
        let messages: Vec<_> = entries.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["Booked seat 3", "Cancelled seat 3", "Booked seat 3"]);
        assert!(entries.windows(2).all(|w| w[0].key.stamp < w[1].key.stamp));

        // Same requester twice: two distinct entries, nothing overwritten.
        assert_eq!(log.entries_for("User1").len(), 2);
    }

    #[test]
    fn concurrent_records_get_unique_keys() {
        let log = Arc::new(StatsLog::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        log.record("same", booked(i, "same"));
                    }
                    t
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(log.len(), 1600);
        assert_eq!(log.snapshot().booked, 1600);
        let stamps: HashSet<_> = log.entries().into_iter().map(|e| e.key.stamp).collect();
        assert_eq!(stamps.len(), 1600);
    }
}
