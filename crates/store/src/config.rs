//! Configuration for the content store

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Share of total capacity a single entry may occupy, in percent
pub const MAX_ENTRY_PERCENT: u64 = 10;

/// Content store configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    /// Cache root directory (index file and `objects/` live here)
    #[serde(default = "default_dir")]
    pub dir: PathBuf,

    /// Total byte budget for all live entries
    #[serde(default = "default_capacity_bytes")]
    pub capacity_bytes: u64,

    /// Time-to-live for new entries in seconds; 0 disables expiry
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// How often the index is persisted and expired entries are swept
    #[serde(default = "default_persist_interval_secs")]
    pub persist_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            capacity_bytes: default_capacity_bytes(),
            default_ttl_secs: default_ttl_secs(),
            persist_interval_secs: default_persist_interval_secs(),
        }
    }
}

impl StoreConfig {
    /// A config rooted at `dir` with the given capacity and default timings
    pub fn new(dir: impl Into<PathBuf>, capacity_bytes: u64) -> Self {
        Self {
            dir: dir.into(),
            capacity_bytes,
            ..Self::default()
        }
    }

    /// Largest payload accepted by a single `put`
    #[must_use]
    pub fn max_entry_bytes(&self) -> u64 {
        self.capacity_bytes / 100 * MAX_ENTRY_PERCENT
            + (self.capacity_bytes % 100) * MAX_ENTRY_PERCENT / 100
    }

    /// Default entry TTL, `None` when expiry is disabled
    #[must_use]
    pub fn default_ttl(&self) -> Option<Duration> {
        (self.default_ttl_secs > 0).then(|| Duration::from_secs(self.default_ttl_secs))
    }

    /// Interval of the maintenance loop
    #[must_use]
    pub fn persist_interval(&self) -> Duration {
        Duration::from_secs(self.persist_interval_secs.max(1))
    }
}

// Default value functions
fn default_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("edgenode")
}

fn default_capacity_bytes() -> u64 {
    10 * 1024 * 1024 * 1024 // 10 GiB
}

fn default_ttl_secs() -> u64 {
    30 * 24 * 60 * 60 // 30 days
}

fn default_persist_interval_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_entry_is_ten_percent() {
        assert_eq!(StoreConfig::new("/tmp/x", 1000).max_entry_bytes(), 100);
        assert_eq!(StoreConfig::new("/tmp/x", 1005).max_entry_bytes(), 100);
        assert_eq!(StoreConfig::new("/tmp/x", 9).max_entry_bytes(), 0);
    }

    #[test]
    fn zero_ttl_disables_expiry() {
        let mut config = StoreConfig::new("/tmp/x", 1000);
        config.default_ttl_secs = 0;
        assert!(config.default_ttl().is_none());
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: StoreConfig = serde_json::from_str(r#"{"dir": "/data/cache"}"#).unwrap();
        assert_eq!(config.dir, PathBuf::from("/data/cache"));
        assert_eq!(config.capacity_bytes, default_capacity_bytes());
        assert_eq!(config.persist_interval(), Duration::from_secs(60));
    }
}
