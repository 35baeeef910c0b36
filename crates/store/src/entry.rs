//! Cache entry metadata and on-disk naming

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::time::Duration;

/// Longest file name produced for a key before it is shortened
const MAX_FILE_NAME: usize = 200;

/// Metadata for one stored byte sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Unique cache key
    pub key: String,
    /// Backing file, owned by the store
    pub location: PathBuf,
    /// Byte length used for capacity accounting
    pub size: u64,
    /// MIME type of the content
    pub content_type: String,
    /// Hex SHA-256 of the content
    pub integrity_tag: String,
    /// When the entry was installed
    pub created_at: DateTime<Utc>,
    /// When the entry stops being served; `None` never expires
    pub expires_at: Option<DateTime<Utc>>,
    /// Reads observed since insertion
    #[serde(default)]
    pub access_count: u64,
    /// Whether this entry is the output of a transform
    #[serde(default)]
    pub is_derived: bool,
    /// Base key a derived entry was produced from (lookup only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_key: Option<String>,
}

impl CacheEntry {
    /// Whether the entry is past its expiry at `now`
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// Whether the entry is past its expiry now
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Quoted `ETag` header value derived from the integrity tag
    #[must_use]
    pub fn etag(&self) -> String {
        format!("\"{}\"", &self.integrity_tag[..self.integrity_tag.len().min(32)])
    }
}

/// Options for a single insert
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// Overrides the store's default TTL; `Some(Duration::ZERO)` expires immediately
    pub ttl: Option<Duration>,
    /// Marks the entry as derived from this base key
    pub source_key: Option<String>,
}

impl PutOptions {
    /// Options for a transform output of `source_key`
    pub fn derived(source_key: impl Into<String>) -> Self {
        Self {
            ttl: None,
            source_key: Some(source_key.into()),
        }
    }

    /// Set an explicit TTL
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Capacity summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Configured byte budget
    pub capacity: u64,
    /// Bytes currently accounted (live entries plus orphans)
    pub current_size: u64,
    /// Number of live entries
    pub entry_count: usize,
}

/// Compute the integrity tag for content
#[must_use]
pub fn integrity_tag(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Map a key to the file name that stores its bytes.
///
/// Bytes outside `[A-Za-z0-9._-]` are percent-encoded, as is a leading `.`
/// so keys can never name `.`, `..` or hidden temp files.
#[must_use]
pub fn file_name_for_key(key: &str) -> String {
    let mut name = String::with_capacity(key.len());
    for (i, byte) in key.bytes().enumerate() {
        let keep = byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.');
        if keep && !(i == 0 && byte == b'.') {
            name.push(char::from(byte));
        } else {
            name.push_str(&format!("%{byte:02X}"));
        }
    }
    if name.len() > MAX_FILE_NAME {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        name.truncate(MAX_FILE_NAME - digest.len() - 1);
        // Never cut through a percent escape
        while name.ends_with('%') || name.as_bytes().get(name.len().saturating_sub(2)) == Some(&b'%') {
            name.pop();
        }
        name.push('~');
        name.push_str(&digest);
    }
    name
}
