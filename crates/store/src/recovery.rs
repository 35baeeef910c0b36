//! Startup recovery of the index
//!
//! With an index file, each recorded entry is verified against its backing
//! file before being registered. Without one, the objects directory is only
//! scanned so orphaned bytes stay accounted.
//!
//! Verified entries beyond the configured capacity are evicted in the usual
//! order before the store opens.

use crate::entry::{CacheEntry, file_name_for_key};
use crate::index::{INDEX_VERSION, Index, IndexFile, Orphan};
use crate::{Error, Result};
use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info, warn};

/// Suffix of in-flight writes
pub(crate) const TEMP_SUFFIX: &str = ".tmp";

/// Where the recovered state came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecoverySource {
    /// A persisted index was loaded and verified
    Index,
    /// No usable index; only directory sizes were accounted
    #[default]
    DirectoryScan,
}

/// Outcome of startup recovery
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Where the state was read from
    pub source: RecoverySource,
    /// Entries registered as live
    pub recovered: usize,
    /// Entries dropped (and deleted) because they had expired
    pub expired: usize,
    /// Entries dropped (and deleted) because the file size did not match
    pub corrupt: usize,
    /// Entries dropped because the backing file was gone
    pub missing: usize,
    /// Entries evicted (and deleted) to fit the configured capacity
    pub evicted: usize,
    /// Unreferenced or partial files deleted
    pub strays_removed: usize,
    /// Files accounted without an entry (directory scan only)
    pub orphan_files: usize,
    /// Bytes of those files
    pub orphan_bytes: u64,
}

pub(crate) async fn recover(
    objects: &Path,
    index_path: &Path,
    capacity: u64,
) -> Result<(Index, RecoveryReport)> {
    match read_index_file(index_path).await {
        Ok(Some(file)) => from_index_file(file, objects, capacity).await,
        Ok(None) => scan_directory(objects).await,
        Err(err) => {
            warn!(
                path = %index_path.display(),
                error = %err,
                "Ignoring unreadable index, falling back to directory scan"
            );
            scan_directory(objects).await
        }
    }
}

async fn read_index_file(path: &Path) -> Result<Option<IndexFile>> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io(e, path, "read")),
    };
    let file: IndexFile = serde_json::from_slice(&raw)
        .map_err(|e| Error::serialization(format!("Failed to parse index: {e}")))?;
    if file.version != INDEX_VERSION {
        return Err(Error::serialization(format!(
            "Unsupported index version {} (expected {INDEX_VERSION})",
            file.version
        )));
    }
    Ok(Some(file))
}

async fn from_index_file(
    file: IndexFile,
    objects: &Path,
    capacity: u64,
) -> Result<(Index, RecoveryReport)> {
    let now = Utc::now();
    let counts: HashMap<String, u64> = file.access_counts.into_iter().collect();
    let mut index = Index::default();
    let mut report = RecoveryReport {
        source: RecoverySource::Index,
        ..RecoveryReport::default()
    };
    let mut referenced = HashSet::new();

    for mut entry in file.entries {
        let file_name = file_name_for_key(&entry.key);
        // Locations are re-derived so a moved cache directory still recovers
        entry.location = objects.join(&file_name);

        if entry.is_expired_at(now) {
            remove_quietly(&entry.location).await;
            report.expired += 1;
            continue;
        }
        match tokio::fs::metadata(&entry.location).await {
            Ok(meta) if meta.len() == entry.size => {}
            Ok(meta) => {
                warn!(
                    key = %entry.key,
                    recorded = entry.size,
                    actual = meta.len(),
                    "Dropping entry with size mismatch"
                );
                remove_quietly(&entry.location).await;
                report.corrupt += 1;
                continue;
            }
            Err(_) => {
                debug!(key = %entry.key, "Dropping entry with missing file");
                report.missing += 1;
                continue;
            }
        }

        let access = counts.get(&entry.key).copied().unwrap_or(entry.access_count);
        referenced.insert(file_name);
        index.insert(entry, access);
        report.recovered += 1;
    }

    for evicted in fit_capacity(&mut index, capacity) {
        remove_quietly(&evicted.location).await;
        report.recovered -= 1;
        report.evicted += 1;
    }

    for (name, path, _) in list_objects(objects).await? {
        if !referenced.contains(&name) {
            remove_quietly(&path).await;
            report.strays_removed += 1;
        }
    }

    info!(
        recovered = report.recovered,
        expired = report.expired,
        corrupt = report.corrupt,
        missing = report.missing,
        evicted = report.evicted,
        strays = report.strays_removed,
        "Recovered content store index"
    );
    Ok((index, report))
}

/// Remove entries, lowest access count then oldest first, until the index
/// fits in `capacity`
fn fit_capacity(index: &mut Index, capacity: u64) -> Vec<CacheEntry> {
    let over = index.current_size.saturating_sub(capacity);
    if over == 0 {
        return Vec::new();
    }
    let victims = index
        .select_victims(over, "")
        .unwrap_or_else(|_| index.slots.keys().cloned().collect());
    let evicted: Vec<CacheEntry> = victims.iter().filter_map(|key| index.remove(key)).collect();
    warn!(
        capacity,
        evicted = evicted.len(),
        current_size = index.current_size,
        "Recovered index exceeded capacity"
    );
    evicted
}

async fn scan_directory(objects: &Path) -> Result<(Index, RecoveryReport)> {
    let mut index = Index::default();
    let mut report = RecoveryReport::default();

    for (name, path, meta) in list_objects(objects).await? {
        if name.ends_with(TEMP_SUFFIX) {
            remove_quietly(&path).await;
            report.strays_removed += 1;
            continue;
        }
        let orphan = Orphan {
            size: meta.len(),
            modified: meta.modified().ok(),
        };
        report.orphan_files += 1;
        report.orphan_bytes += orphan.size;
        index.add_orphan(name, orphan);
    }

    info!(
        orphan_files = report.orphan_files,
        orphan_bytes = report.orphan_bytes,
        "No index found; starting cold with orphaned bytes accounted"
    );
    Ok((index, report))
}

async fn list_objects(objects: &Path) -> Result<Vec<(String, std::path::PathBuf, std::fs::Metadata)>> {
    let mut files = Vec::new();
    let mut dir = match tokio::fs::read_dir(objects).await {
        Ok(dir) => dir,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(files),
        Err(e) => return Err(Error::io(e, objects, "read_dir")),
    };
    while let Some(item) = dir
        .next_entry()
        .await
        .map_err(|e| Error::io(e, objects, "read_dir_entry"))?
    {
        let path = item.path();
        let Ok(meta) = item.metadata().await else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        files.push((item.file_name().to_string_lossy().into_owned(), path, meta));
    }
    Ok(files)
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove cache file"),
    }
}
