//! Bounded in-memory store for accepted log entries
//!
//! Entries are kept in arrival order. Once the buffer is full every push
//! evicts exactly the oldest entry. Clones share the same storage, so the
//! stream task can push while other tasks read snapshots.

use crate::{BridgeError, LogLevel, LogcatEntry, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Default number of retained entries
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Statistics about buffer usage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferStats {
    pub total_entries: usize,
    pub capacity: usize,
    /// Entries dropped by eviction since creation
    pub evicted: u64,
    pub entries_by_level: HashMap<LogLevel, usize>,
}

#[derive(Debug, Clone)]
pub struct EntryBuffer {
    capacity: usize,
    entries: Arc<RwLock<VecDeque<LogcatEntry>>>,
    evicted: Arc<AtomicU64>,
}

impl EntryBuffer {
    /// Create a buffer with a fixed capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Arc::new(RwLock::new(VecDeque::with_capacity(capacity.min(1024)))),
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an entry, evicting the oldest one if over capacity
    pub fn push(&self, entry: LogcatEntry) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| BridgeError::lock("entry buffer"))?;

        entries.push_back(entry);
        if entries.len() > self.capacity {
            entries.pop_front();
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Copy of all entries, oldest first
    pub fn snapshot(&self) -> Result<Vec<LogcatEntry>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| BridgeError::lock("entry buffer"))?;
        Ok(entries.iter().cloned().collect())
    }

    /// The most recent `count` entries, oldest first
    pub fn recent(&self, count: usize) -> Result<Vec<LogcatEntry>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| BridgeError::lock("entry buffer"))?;
        let start = entries.len().saturating_sub(count);
        Ok(entries.range(start..).cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empty the local buffer; the on-device log is untouched
    pub fn clear(&self) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| BridgeError::lock("entry buffer"))?;
        let dropped = entries.len();
        entries.clear();
        debug!("Entry buffer cleared ({} entries)", dropped);
        Ok(())
    }

    pub fn stats(&self) -> Result<BufferStats> {
        let entries = self
            .entries
            .read()
            .map_err(|_| BridgeError::lock("entry buffer"))?;

        let mut entries_by_level = HashMap::new();
        for entry in entries.iter() {
            *entries_by_level.entry(entry.level).or_insert(0) += 1;
        }

        Ok(BufferStats {
            total_entries: entries.len(),
            capacity: self.capacity,
            evicted: self.evicted.load(Ordering::Relaxed),
            entries_by_level,
        })
    }
}

impl Default for EntryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}
