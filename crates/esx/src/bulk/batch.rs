//! 🪣 The accumulator: collects entries until the next one would spill the bucket.
//!
//! Two thresholds, bytes and entries, first one reached wins. The check happens BEFORE an
//! entry goes in: if it would cross a threshold, the current contents leave as a ready batch
//! and the newcomer starts the next one. An entry that alone exceeds the byte threshold is
//! refused outright; it would never fit, and no amount of flushing changes that.
//!
//! 🧠 Knowledge graph: one accumulator per write task, never shared. `drain` is the only way
//! out, and it resets the counters in the same breath.

use tracing::trace;

use super::command::BulkEntry;
use crate::error::{ConnectorError, Result};

/// 📦 An ordered run of entries plus its byte total.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    entries: Vec<BulkEntry>,
    bytes: usize,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn entries(&self) -> &[BulkEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<BulkEntry> {
        self.entries
    }

    fn push(&mut self, entry: BulkEntry) {
        self.bytes += entry.size();
        self.entries.push(entry);
    }
}

impl FromIterator<BulkEntry> for Batch {
    fn from_iter<I: IntoIterator<Item = BulkEntry>>(iter: I) -> Self {
        let mut batch = Batch::default();
        for entry in iter {
            batch.push(entry);
        }
        batch
    }
}

#[derive(Debug)]
pub struct BatchAccumulator {
    max_bytes: usize,
    max_entries: usize,
    manual: bool,
    current: Batch,
}

impl BatchAccumulator {
    /// 🏗️ `manual` ignores both thresholds for flushing; the oversize check still applies.
    pub fn new(max_bytes: usize, max_entries: usize, manual: bool) -> Self {
        Self {
            max_bytes,
            max_entries: max_entries.max(1),
            manual,
            current: Batch::default(),
        }
    }

    /// ➕ Add an entry. Returns the previous contents when they had to leave first.
    pub fn append(&mut self, entry: BulkEntry) -> Result<Option<Batch>> {
        let size = entry.size();
        if size > self.max_bytes {
            return Err(ConnectorError::Oversize {
                size,
                limit: self.max_bytes,
            });
        }
        let ready = if !self.manual
            && !self.current.is_empty()
            && (self.current.bytes + size > self.max_bytes
                || self.current.len() + 1 > self.max_entries)
        {
            trace!(
                "🪣 flush-before-insert: {} entries / {} bytes leave before a {size} byte entry",
                self.current.len(),
                self.current.bytes
            );
            Some(self.drain())
        } else {
            None
        };
        self.current.push(entry);
        Ok(ready)
    }

    /// 🚦 a threshold has been reached exactly (never true in manual mode)
    pub fn should_flush(&self) -> bool {
        !self.manual
            && (self.current.bytes >= self.max_bytes || self.current.len() >= self.max_entries)
    }

    /// 📤 Hand off everything and start over.
    pub fn drain(&mut self) -> Batch {
        std::mem::take(&mut self.current)
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub fn bytes(&self) -> usize {
        self.current.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 🧪 an entry of exactly `size` bytes (action line + newline, no document)
    fn entry(tag: usize, size: usize) -> BulkEntry {
        let prefix = format!("{{\"delete\":{{\"_id\":\"{tag}\",\"pad\":\"");
        let pad = size - 1 - prefix.len() - 3;
        BulkEntry::new(
            format!("{prefix}{}\"}}}}", "x".repeat(pad)),
            None,
            "i".to_string(),
            Some(tag.to_string()),
        )
    }

    #[test]
    fn the_one_where_the_third_400_byte_entry_pushes_out_the_first_two() -> Result<()> {
        let mut accumulator = BatchAccumulator::new(1000, 100, false);
        assert_eq!(entry(0, 400).size(), 400);
        assert!(accumulator.append(entry(0, 400))?.is_none());
        assert!(accumulator.append(entry(1, 400))?.is_none());
        assert!(!accumulator.should_flush());
        let flushed = accumulator.append(entry(2, 400))?.expect("💀 third append must flush");
        assert_eq!(flushed.len(), 2);
        assert_eq!(flushed.bytes(), 800);
        assert_eq!(accumulator.len(), 1);
        assert_eq!(accumulator.bytes(), 400);
        Ok(())
    }

    #[test]
    fn the_one_where_oversize_entries_never_get_in() {
        let mut accumulator = BatchAccumulator::new(100, 10, true);
        let err = accumulator.append(entry(0, 101)).expect_err("💀 oversize must be refused");
        assert!(matches!(err, ConnectorError::Oversize { size: 101, limit: 100 }));
        assert!(accumulator.is_empty());
    }

    #[test]
    fn the_one_where_thresholds_hold_after_every_automatic_decision() -> Result<()> {
        let mut accumulator = BatchAccumulator::new(1000, 3, false);
        let mut flushed = Vec::new();
        for tag in 0..50 {
            if let Some(batch) = accumulator.append(entry(tag, 150 + (tag * 37) % 300))? {
                flushed.push(batch);
            }
            if accumulator.should_flush() {
                flushed.push(accumulator.drain());
            }
            assert!(accumulator.bytes() <= 1000);
            assert!(accumulator.len() <= 3);
        }
        for batch in &flushed {
            assert!(batch.bytes() <= 1000, "batch of {} bytes", batch.bytes());
            assert!(batch.len() <= 3);
        }
        Ok(())
    }

    #[test]
    fn the_one_where_the_entry_count_trips_first() -> Result<()> {
        let mut accumulator = BatchAccumulator::new(1_000_000, 2, false);
        accumulator.append(entry(0, 50))?;
        assert!(!accumulator.should_flush());
        accumulator.append(entry(1, 50))?;
        assert!(accumulator.should_flush());
        Ok(())
    }

    #[test]
    fn the_one_where_manual_mode_hoards_everything() -> Result<()> {
        let mut accumulator = BatchAccumulator::new(1000, 2, true);
        for tag in 0..10 {
            assert!(accumulator.append(entry(tag, 400))?.is_none());
        }
        assert!(!accumulator.should_flush());
        assert_eq!(accumulator.len(), 10);
        Ok(())
    }

    #[test]
    fn the_one_where_drain_hands_everything_over_exactly_once() -> Result<()> {
        let mut accumulator = BatchAccumulator::new(10_000, 100, false);
        for tag in 0..5 {
            accumulator.append(entry(tag, 60))?;
        }
        let batch = accumulator.drain();
        let ids: Vec<_> = batch.entries().iter().filter_map(BulkEntry::id).collect();
        assert_eq!(ids, vec!["0", "1", "2", "3", "4"]);
        assert!(accumulator.is_empty());
        assert_eq!(accumulator.bytes(), 0);
        assert!(accumulator.drain().is_empty());
        Ok(())
    }
}
