//! Distributed cache tier consulted ahead of the local store
//!
//! The tier is an accelerator only. Its operations cannot fail from the
//! caller's point of view: backends log and swallow their own errors.

use async_trait::async_trait;
use bytes::Bytes;
use edgenode_store::CacheEntry;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Entry metadata together with its bytes
#[derive(Debug, Clone)]
pub struct TierObject {
    /// Metadata as stored locally
    pub entry: CacheEntry,
    /// Content bytes
    pub body: Bytes,
}

/// A best-effort shared cache
#[async_trait]
pub trait RemoteTier: Send + Sync + fmt::Debug {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Fetch a live object
    async fn get(&self, key: &str) -> Option<TierObject>;

    /// Store or replace an object
    async fn set(&self, object: TierObject);

    /// Drop one key
    async fn delete(&self, key: &str);

    /// Drop everything
    async fn flush(&self);
}

/// Tier used when none is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTier;

#[async_trait]
impl RemoteTier for NoopTier {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn get(&self, _key: &str) -> Option<TierObject> {
        None
    }

    async fn set(&self, _object: TierObject) {}

    async fn delete(&self, _key: &str) {}

    async fn flush(&self) {}
}

/// Bounded in-process LRU tier with a per-object TTL
pub struct MemoryTier {
    entries: Mutex<LruCache<String, (TierObject, Instant)>>,
    ttl: Duration,
}

impl fmt::Debug for MemoryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTier")
            .field("len", &self.entries.lock().len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl MemoryTier {
    /// Create a tier holding at most `max_entries` objects for `ttl` each
    #[must_use]
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Objects currently held, including ones not yet noticed as expired
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the tier holds nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RemoteTier for MemoryTier {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Option<TierObject> {
        let mut entries = self.entries.lock();
        let fresh = match entries.get(key) {
            Some((object, stored_at)) => {
                stored_at.elapsed() < self.ttl && !object.entry.is_expired()
            }
            None => return None,
        };
        if fresh {
            return entries.get(key).map(|(object, _)| object.clone());
        }
        entries.pop(key);
        debug!(key, "Dropped stale memory tier object");
        None
    }

    async fn set(&self, object: TierObject) {
        let key = object.entry.key.clone();
        self.entries.lock().put(key, (object, Instant::now()));
    }

    async fn delete(&self, key: &str) {
        self.entries.lock().pop(key);
    }

    async fn flush(&self) {
        self.entries.lock().clear();
    }
}

/// Which tier backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierKind {
    /// No distributed tier
    #[default]
    None,
    /// In-process LRU
    Memory,
}

/// Distributed tier configuration (`[tier]` section)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TierConfig {
    /// Backend selection
    #[serde(default)]
    pub kind: TierKind,

    /// Objects kept by the memory backend
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Seconds an object stays in the tier
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            kind: TierKind::default(),
            max_entries: default_max_entries(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl TierConfig {
    /// Instantiate the configured backend
    #[must_use]
    pub fn build(&self) -> Arc<dyn RemoteTier> {
        match self.kind {
            TierKind::None => Arc::new(NoopTier),
            TierKind::Memory => Arc::new(MemoryTier::new(
                self.max_entries,
                Duration::from_secs(self.ttl_secs),
            )),
        }
    }
}

fn default_max_entries() -> usize {
    1024
}

fn default_ttl_secs() -> u64 {
    300
}
