//! In-memory index and its persisted form

use crate::entry::CacheEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Version tag written into the index file
pub const INDEX_VERSION: u32 = 1;

/// Index file name inside the cache root
pub const INDEX_FILE: &str = "index.json";

/// Durable record of all live entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexFile {
    /// Format version
    pub version: u32,
    /// When the snapshot was taken
    pub saved_at: DateTime<Utc>,
    /// Live entries in insertion order
    pub entries: Vec<CacheEntry>,
    /// Raw access-count table
    pub access_counts: Vec<(String, u64)>,
}

/// A live entry plus its eviction bookkeeping
#[derive(Debug)]
pub(crate) struct Slot {
    pub(crate) entry: CacheEntry,
    pub(crate) access: AtomicU64,
    pub(crate) seq: u64,
}

impl Slot {
    pub(crate) fn access_count(&self) -> u64 {
        self.access.load(Ordering::Relaxed)
    }

    /// Entry metadata with the live access count filled in
    pub(crate) fn snapshot(&self) -> CacheEntry {
        let mut entry = self.entry.clone();
        entry.access_count = self.access_count();
        entry
    }
}

/// A file found on disk that no entry owns
#[derive(Debug, Clone)]
pub(crate) struct Orphan {
    pub(crate) size: u64,
    pub(crate) modified: Option<SystemTime>,
}

#[derive(Debug, Default)]
pub(crate) struct Index {
    pub(crate) slots: HashMap<String, Slot>,
    /// Orphan files keyed by file name, still counted in `current_size`
    pub(crate) orphans: HashMap<String, Orphan>,
    pub(crate) current_size: u64,
    next_seq: u64,
}

impl Index {
    /// Install an entry, returning the one it replaced
    pub(crate) fn insert(&mut self, entry: CacheEntry, access_count: u64) -> Option<CacheEntry> {
        let replaced = self.remove(&entry.key);
        self.current_size += entry.size;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots.insert(
            entry.key.clone(),
            Slot {
                entry,
                access: AtomicU64::new(access_count),
                seq,
            },
        );
        replaced
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let slot = self.slots.remove(key)?;
        self.current_size = self.current_size.saturating_sub(slot.entry.size);
        Some(slot.snapshot())
    }

    pub(crate) fn add_orphan(&mut self, file_name: String, orphan: Orphan) {
        self.current_size += orphan.size;
        if let Some(previous) = self.orphans.insert(file_name, orphan) {
            self.current_size = self.current_size.saturating_sub(previous.size);
        }
    }

    pub(crate) fn remove_orphan(&mut self, file_name: &str) -> Option<Orphan> {
        let orphan = self.orphans.remove(file_name)?;
        self.current_size = self.current_size.saturating_sub(orphan.size);
        Some(orphan)
    }

    pub(crate) fn orphan_bytes(&self) -> u64 {
        self.orphans.values().map(|o| o.size).sum()
    }

    /// Pick eviction victims freeing at least `needed` bytes.
    ///
    /// Order is lowest access count first, then oldest insertion. `exclude`
    /// is never selected. Returns `Err(evictable)` when every candidate
    /// together is not enough.
    pub(crate) fn select_victims(&self, needed: u64, exclude: &str) -> Result<Vec<String>, u64> {
        if needed == 0 {
            return Ok(Vec::new());
        }
        let mut candidates: Vec<(u64, u64, &str, u64)> = self
            .slots
            .iter()
            .filter(|(key, _)| key.as_str() != exclude)
            .map(|(key, slot)| (slot.access_count(), slot.seq, key.as_str(), slot.entry.size))
            .collect();
        candidates.sort_unstable_by_key(|&(access, seq, _, _)| (access, seq));

        let mut freed = 0u64;
        let mut victims = Vec::new();
        for (_, _, key, size) in candidates {
            if freed >= needed {
                break;
            }
            freed += size;
            victims.push(key.to_string());
        }
        if freed >= needed {
            Ok(victims)
        } else {
            Err(freed)
        }
    }

    /// Keys whose entries are expired at `now`, with their sequence numbers
    pub(crate) fn expired(&self, now: DateTime<Utc>) -> Vec<(String, u64)> {
        self.slots
            .iter()
            .filter(|(_, slot)| slot.entry.is_expired_at(now))
            .map(|(key, slot)| (key.clone(), slot.seq))
            .collect()
    }

    pub(crate) fn seq_of(&self, key: &str) -> Option<u64> {
        self.slots.get(key).map(|slot| slot.seq)
    }

    /// Snapshot for persistence, entries in insertion order
    pub(crate) fn to_file(&self) -> IndexFile {
        let mut slots: Vec<&Slot> = self.slots.values().collect();
        slots.sort_unstable_by_key(|slot| slot.seq);
        let entries: Vec<CacheEntry> = slots.iter().map(|slot| slot.snapshot()).collect();
        let access_counts = entries
            .iter()
            .map(|entry| (entry.key.clone(), entry.access_count))
            .collect();
        IndexFile {
            version: INDEX_VERSION,
            saved_at: Utc::now(),
            entries,
            access_counts,
        }
    }
}
