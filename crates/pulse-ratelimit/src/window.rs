//! Per-key fixed-window counters with expiry.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// One counter window for one key.
#[derive(Debug, Clone)]
pub struct WindowEntry {
    /// Requests observed in the current window, including the one being
    /// checked.
    pub count: u32,
    /// Instant at which the window rolls over.
    pub reset_at: DateTime<Utc>,
}

/// Concurrent map of key → window entry.
///
/// All mutation happens inside the DashMap entry closure, so a
/// check-and-increment is a single read-modify-write under the shard lock —
/// concurrent calls for the same key never lose updates.
#[derive(Debug, Default)]
pub struct FixedWindowStore {
    entries: DashMap<String, WindowEntry>,
}

impl FixedWindowStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Atomically roll the window if expired, increment the counter, and
    /// return a snapshot of the entry after the increment.
    pub fn increment(&self, key: &str, window: Duration, now: DateTime<Utc>) -> WindowEntry {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| WindowEntry {
                count: 0,
                reset_at: now + window,
            });

        if now >= entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + window;
        }
        entry.count += 1;

        entry.clone()
    }

    /// Drop entries whose window expired more than one full window ago.
    /// Bounds memory when many transient keys pass through a long-lived
    /// process. Returns the number of removed entries.
    pub fn sweep(&self, window: Duration, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| now <= e.reset_at + window);
        before - self.entries.len()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
