use chrono::{DateTime, Utc};
use std::time::Duration;

/// One executed query outcome, as kept in the raw ring buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntry {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub latency: Duration,
    pub success: bool,
    pub error_category: Option<String>,
}

impl RawEntry {
    pub fn success(timestamp: DateTime<Utc>, operation: impl Into<String>, latency: Duration) -> Self {
        Self { timestamp, operation: operation.into(), latency, success: true, error_category: None }
    }

    pub fn failure(
        timestamp: DateTime<Utc>,
        operation: impl Into<String>,
        latency: Duration,
        error_category: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            operation: operation.into(),
            latency,
            success: false,
            error_category: Some(error_category.into()),
        }
    }
}

/// Bytes of memory budget a default-capacity ring buffer is sized from.
pub const DEFAULT_MEMORY_BUDGET_BYTES: u64 = 64 * 1024 * 1024;
/// Approximate per-slot footprint used to turn a memory budget into a slot count.
const APPROX_ENTRY_BYTES: u64 = 128;

pub fn capacity_for_budget(memory_budget_bytes: u64) -> usize {
    ((memory_budget_bytes / APPROX_ENTRY_BYTES).max(1)) as usize
}

/// Fixed-capacity circular buffer of raw entries. Preallocated; `add` never
/// grows the backing storage, it only overwrites the oldest slot once full.
pub struct RawRingBuffer {
    slots: Vec<Option<RawEntry>>,
    head: usize,
    len: usize,
}

impl RawRingBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: vec![None; capacity],
            head: 0,
            len: 0,
        }
    }

    pub fn from_memory_budget(memory_budget_bytes: u64) -> Self {
        Self::with_capacity(capacity_for_budget(memory_budget_bytes))
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// O(1). If full, overwrites the oldest (tail) slot.
    pub fn add(&mut self, entry: RawEntry) {
        let cap = self.slots.len();
        let write_at = (self.head + self.len) % cap;
        if self.len == cap {
            self.head = (self.head + 1) % cap;
        } else {
            self.len += 1;
        }
        self.slots[write_at] = Some(entry);
    }

    fn tail_index(&self) -> usize {
        (self.head + self.len - 1) % self.slots.len()
    }

    /// Evict entries from the tail (oldest-first at `head`) while the
    /// head entry predates `now - retention`. Returns the evicted entries
    /// in chronological (oldest-first) order.
    pub fn prune(&mut self, now: DateTime<Utc>, retention: Duration) -> Vec<RawEntry> {
        let cutoff = now - chrono::Duration::from_std(retention).unwrap_or_default();
        let mut evicted = Vec::new();
        let cap = self.slots.len();
        while self.len > 0 {
            let idx = self.head;
            let is_stale = self.slots[idx].as_ref().map(|e| e.timestamp < cutoff).unwrap_or(false);
            if !is_stale {
                break;
            }
            if let Some(entry) = self.slots[idx].take() {
                evicted.push(entry);
            }
            self.head = (self.head + 1) % cap;
            self.len -= 1;
        }
        evicted
    }

    /// Drain the entire buffer, oldest-first, leaving it empty.
    pub fn flush(&mut self) -> Vec<RawEntry> {
        let mut out = Vec::with_capacity(self.len);
        while self.len > 0 {
            let idx = self.head;
            if let Some(entry) = self.slots[idx].take() {
                out.push(entry);
            }
            self.head = (self.head + 1) % self.slots.len();
            self.len -= 1;
        }
        out
    }

    pub fn newest(&self) -> Option<&RawEntry> {
        if self.len == 0 {
            None
        } else {
            self.slots[self.tail_index()].as_ref()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(secs: i64) -> RawEntry {
        RawEntry::success(Utc::now() + chrono::Duration::seconds(secs), "op", Duration::from_millis(1))
    }

    #[test]
    fn add_is_o1_and_overwrites_oldest_when_full() {
        let mut ring = RawRingBuffer::with_capacity(3);
        ring.add(entry(0));
        ring.add(entry(1));
        ring.add(entry(2));
        assert_eq!(ring.len(), 3);
        ring.add(entry(3));
        assert_eq!(ring.len(), 3);
        let all = ring.flush();
        // Oldest entry (secs=0) was overwritten; remaining are 1,2,3 in order.
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn prune_evicts_only_entries_older_than_retention() {
        let mut ring = RawRingBuffer::with_capacity(10);
        let now = Utc::now();
        ring.add(RawEntry::success(now - chrono::Duration::seconds(120), "old", Duration::from_millis(1)));
        ring.add(RawEntry::success(now - chrono::Duration::seconds(1), "new", Duration::from_millis(1)));
        let evicted = ring.prune(now, Duration::from_secs(60));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].operation, "old");
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn capacity_for_budget_matches_default_512ki() {
        assert_eq!(capacity_for_budget(DEFAULT_MEMORY_BUDGET_BYTES), 512 * 1024);
    }

    #[test]
    fn flush_drains_everything_in_order() {
        let mut ring = RawRingBuffer::with_capacity(5);
        for i in 0..4 {
            ring.add(entry(i));
        }
        let out = ring.flush();
        assert_eq!(out.len(), 4);
        assert!(ring.is_empty());
    }
}
