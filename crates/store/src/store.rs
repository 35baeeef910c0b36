//! The content store
//!
//! One instance owns the cache directory. Metadata lives in a single
//! [`RwLock`]-guarded index; byte transfer happens outside that lock.
//! File unlinks and the commit rename run while the index lock is held so a
//! concurrent commit for the same key can never be clobbered.

use crate::config::StoreConfig;
use crate::entry::{CacheEntry, PutOptions, StoreStats, file_name_for_key, integrity_tag};
use crate::index::{INDEX_FILE, Index, Orphan};
use crate::locks::KeyLocks;
use crate::recovery::{self, RecoveryReport, TEMP_SUFFIX};
use crate::{Error, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use regex::Regex;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::{Duration, SystemTime};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Directory holding one file per key
pub const OBJECTS_DIR: &str = "objects";

/// Longest key accepted by the store
pub const MAX_KEY_LEN: usize = 2048;

/// Result of an expiry sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Expired entries removed
    pub expired: usize,
    /// Orphan files that aged out
    pub orphans_removed: usize,
}

/// Capacity-bounded disk cache with LRU eviction and a persisted index
#[derive(Debug)]
pub struct ContentStore {
    config: StoreConfig,
    objects: PathBuf,
    index_path: PathBuf,
    index: RwLock<Index>,
    locks: KeyLocks,
    persist: tokio::sync::Mutex<()>,
    recovery: RecoveryReport,
}

impl ContentStore {
    /// Open the store rooted at `config.dir`, recovering any persisted index
    pub async fn open(config: StoreConfig) -> Result<Self> {
        let objects = config.dir.join(OBJECTS_DIR);
        tokio::fs::create_dir_all(&objects)
            .await
            .map_err(|e| Error::io(e, &objects, "create_dir_all"))?;
        let index_path = config.dir.join(INDEX_FILE);

        let (index, recovery) =
            recovery::recover(&objects, &index_path, config.capacity_bytes).await?;
        info!(
            dir = %config.dir.display(),
            capacity = config.capacity_bytes,
            current_size = index.current_size,
            entries = index.slots.len(),
            "Content store opened"
        );

        Ok(Self {
            config,
            objects,
            index_path,
            index: RwLock::new(index),
            locks: KeyLocks::default(),
            persist: tokio::sync::Mutex::new(()),
            recovery,
        })
    }

    /// Store configuration
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// What startup recovery found
    #[must_use]
    pub fn last_recovery(&self) -> &RecoveryReport {
        &self.recovery
    }

    /// Path of the persisted index file
    #[must_use]
    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Insert `data` under `key` with the default TTL
    pub async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<CacheEntry> {
        self.put_with(key, data, content_type, PutOptions::default())
            .await
    }

    /// Insert `data` under `key`, replacing any existing entry.
    ///
    /// Eviction runs before the new entry is installed so the capacity is
    /// never exceeded.
    pub async fn put_with(
        &self,
        key: &str,
        data: &[u8],
        content_type: &str,
        options: PutOptions,
    ) -> Result<CacheEntry> {
        validate_key(key)?;
        let size = data.len() as u64;
        let limit = self.config.max_entry_bytes();
        if size > limit {
            return Err(Error::OversizedEntry {
                key: key.to_string(),
                size,
                limit,
            });
        }

        let _guard = self.locks.write(key).await;
        let file_name = file_name_for_key(key);
        let tmp = self
            .objects
            .join(format!(".{}{TEMP_SUFFIX}", Uuid::new_v4().simple()));
        if let Err(e) = write_file(&tmp, data).await {
            discard(&tmp).await;
            return Err(Error::storage_write(key, e));
        }

        let now = Utc::now();
        let entry = CacheEntry {
            key: key.to_string(),
            location: self.objects.join(&file_name),
            size,
            content_type: content_type.to_string(),
            integrity_tag: integrity_tag(data),
            created_at: now,
            expires_at: expiry(now, options.ttl.or_else(|| self.config.default_ttl())),
            access_count: 0,
            is_derived: options.source_key.is_some(),
            source_key: options.source_key,
        };

        match self.commit(entry.clone(), &tmp, &file_name) {
            Ok(evicted) => {
                if !evicted.is_empty() {
                    debug!(key, evicted = ?evicted, "Evicted entries to make room");
                }
                debug!(key, size, derived = entry.is_derived, "Stored entry");
                Ok(entry)
            }
            Err(e) => {
                discard(&tmp).await;
                Err(e)
            }
        }
    }

    /// Evict, rename into place and install metadata in one critical section
    fn commit(&self, entry: CacheEntry, tmp: &Path, file_name: &str) -> Result<Vec<String>> {
        let mut index = self.index.write();
        let replaced = index.slots.get(&entry.key).map_or(0, |slot| slot.entry.size);
        let orphan = index.orphans.get(file_name).map_or(0, |o| o.size);
        let projected = index
            .current_size
            .saturating_sub(replaced + orphan)
            .saturating_add(entry.size);

        let capacity = self.config.capacity_bytes;
        let victims = if projected > capacity {
            let needed = projected - capacity;
            index
                .select_victims(needed, &entry.key)
                .map_err(|evictable| Error::InsufficientSpace {
                    key: entry.key.clone(),
                    needed,
                    evictable,
                })?
        } else {
            Vec::new()
        };

        for victim in &victims {
            if let Some(evicted) = index.remove(victim) {
                unlink_entry(&mut index, &evicted);
            }
        }

        std::fs::rename(tmp, &entry.location).map_err(|e| Error::storage_write(&entry.key, e))?;
        index.remove_orphan(file_name);
        index.insert(entry, 0);
        Ok(victims)
    }

    /// Look up a live entry, counting the access.
    ///
    /// An expired entry found here is removed and reported absent.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let now = Utc::now();
        let stale_seq = {
            let index = self.index.read();
            let slot = index.slots.get(key)?;
            if !slot.entry.is_expired_at(now) {
                slot.access.fetch_add(1, Ordering::Relaxed);
                return Some(slot.snapshot());
            }
            slot.seq
        };
        self.expire(key, stale_seq);
        None
    }

    /// Look up an entry and read its bytes.
    ///
    /// Holds the key's shared lock so a concurrent `put` or `delete` of the
    /// same key cannot interleave with the read. A file removed by eviction
    /// in the meantime reads as a miss.
    pub async fn fetch(&self, key: &str) -> Result<Option<(CacheEntry, Bytes)>> {
        let _guard = self.locks.read(key).await;
        let Some(entry) = self.get(key) else {
            return Ok(None);
        };
        match tokio::fs::read(&entry.location).await {
            Ok(data) => Ok(Some((entry, Bytes::from(data)))),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(key, "Entry evicted while reading");
                Ok(None)
            }
            Err(e) => Err(Error::io(e, &entry.location, "read")),
        }
    }

    /// Remove a single entry; returns whether it existed
    pub async fn delete(&self, key: &str) -> bool {
        let _guard = self.locks.write(key).await;
        let mut index = self.index.write();
        match index.remove(key) {
            Some(entry) => {
                unlink_entry(&mut index, &entry);
                debug!(key, "Deleted entry");
                true
            }
            None => false,
        }
    }

    /// Remove every entry and the persisted index
    pub async fn purge(&self) -> Result<usize> {
        let _persist = self.persist.lock().await;

        // Index goes first so a crash mid-purge cannot resurrect stale entries
        match tokio::fs::remove_file(&self.index_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(Error::io(e, &self.index_path, "remove_file")),
        }

        let mut index = self.index.write();
        let slots = std::mem::take(&mut index.slots);
        let orphans = std::mem::take(&mut index.orphans);
        index.current_size = 0;
        let count = slots.len();
        for slot in slots.into_values() {
            let entry = slot.entry;
            unlink_entry(&mut index, &entry);
        }
        for name in orphans.into_keys() {
            remove_file_sync(&self.objects.join(name));
        }
        info!(removed = count, "Purged content store");
        Ok(count)
    }

    /// Remove every entry whose whole key matches `pattern`; returns the count
    pub fn invalidate(&self, pattern: &str) -> Result<usize> {
        self.invalidate_keys(pattern).map(|keys| keys.len())
    }

    /// Remove every entry whose whole key matches `pattern`; returns the keys
    pub fn invalidate_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|source| {
            Error::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            }
        })?;

        let mut index = self.index.write();
        let keys: Vec<String> = index
            .slots
            .keys()
            .filter(|key| regex.is_match(key))
            .cloned()
            .collect();
        for key in &keys {
            if let Some(entry) = index.remove(key) {
                unlink_entry(&mut index, &entry);
            }
        }
        info!(pattern, removed = keys.len(), "Invalidated entries");
        Ok(keys)
    }

    /// Capacity summary
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let index = self.index.read();
        StoreStats {
            capacity: self.config.capacity_bytes,
            current_size: index.current_size,
            entry_count: index.slots.len(),
        }
    }

    /// Bytes accounted for files no entry owns
    #[must_use]
    pub fn orphan_bytes(&self) -> u64 {
        self.index.read().orphan_bytes()
    }

    /// Remove expired entries and age out orphan files
    pub fn sweep_expired(&self) -> SweepReport {
        let now = Utc::now();
        let mut index = self.index.write();
        let mut report = SweepReport::default();

        for (key, _) in index.expired(now) {
            if let Some(entry) = index.remove(&key) {
                unlink_entry(&mut index, &entry);
                report.expired += 1;
            }
        }

        if let Some(ttl) = self.config.default_ttl() {
            let cutoff = SystemTime::now().checked_sub(ttl);
            let aged: Vec<String> = index
                .orphans
                .iter()
                .filter(|(_, orphan)| match (orphan.modified, cutoff) {
                    (Some(modified), Some(cutoff)) => modified <= cutoff,
                    _ => false,
                })
                .map(|(name, _)| name.clone())
                .collect();
            for name in aged {
                if remove_file_sync(&self.objects.join(&name)) {
                    index.remove_orphan(&name);
                    report.orphans_removed += 1;
                }
            }
        }

        if report.expired > 0 || report.orphans_removed > 0 {
            debug!(
                expired = report.expired,
                orphans = report.orphans_removed,
                "Swept expired content"
            );
        }
        report
    }

    /// Atomically write the index file
    pub async fn save_index(&self) -> Result<()> {
        let _persist = self.persist.lock().await;
        let file = self.index.read().to_file();
        let json = serde_json::to_vec_pretty(&file)
            .map_err(|e| Error::serialization(format!("Failed to serialize index: {e}")))?;

        let tmp = self.index_path.with_extension("json.tmp");
        if let Err(e) = write_file(&tmp, &json).await {
            discard(&tmp).await;
            return Err(Error::io(e, &tmp, "write"));
        }
        tokio::fs::rename(&tmp, &self.index_path)
            .await
            .map_err(|e| Error::io(e, &self.index_path, "rename"))?;
        debug!(entries = file.entries.len(), "Persisted content store index");
        Ok(())
    }

    /// Persist the index for a clean shutdown
    pub async fn close(&self) -> Result<()> {
        self.save_index().await?;
        info!("Content store closed");
        Ok(())
    }

    fn expire(&self, key: &str, seq: u64) {
        let mut index = self.index.write();
        // A newer put may have replaced the stale entry in the meantime
        if index.seq_of(key) != Some(seq) {
            return;
        }
        if let Some(entry) = index.remove(key) {
            unlink_entry(&mut index, &entry);
            debug!(key, "Removed expired entry");
        }
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::invalid_key("key must not be empty"));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(Error::invalid_key(format!(
            "key is {} bytes, longer than {MAX_KEY_LEN}",
            key.len()
        )));
    }
    Ok(())
}

fn expiry(now: DateTime<Utc>, ttl: Option<Duration>) -> Option<DateTime<Utc>> {
    let ttl = chrono::Duration::from_std(ttl?).ok()?;
    now.checked_add_signed(ttl)
}

/// Unlink an entry's file; bytes that cannot be removed stay accounted as an orphan
fn unlink_entry(index: &mut Index, entry: &CacheEntry) {
    if !remove_file_sync(&entry.location) {
        if let Some(name) = entry.location.file_name() {
            index.add_orphan(
                name.to_string_lossy().into_owned(),
                Orphan {
                    size: entry.size,
                    modified: None,
                },
            );
        }
    }
}

/// Returns false only when the file exists but could not be removed
fn remove_file_sync(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove cache file");
            false
        }
    }
}

async fn write_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    Ok(())
}

async fn discard(path: &Path) {
    let _ = tokio::fs::remove_file(path).await;
}
