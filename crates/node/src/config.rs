//! Node configuration file
//!
//! ```toml
//! warmup = ["/logo.png"]
//!
//! [store]
//! dir = "/var/cache/edgenode"
//! capacity_bytes = 10737418240
//!
//! [origin]
//! enabled = true
//! base_url = "https://origin.example.com"
//!
//! [tier]
//! kind = "memory"
//! ```

use crate::error::{Error, Result};
use crate::tier::TierConfig;
use edgenode_origin::OriginConfig;
use edgenode_store::StoreConfig;
use edgenode_transform::TransformConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Overrides `store.dir`
pub const ENV_CACHE_DIR: &str = "EDGENODE_CACHE_DIR";

/// Overrides `origin.base_url` and enables the origin
pub const ENV_ORIGIN_URL: &str = "EDGENODE_ORIGIN_URL";

/// Complete edge node configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EdgeConfig {
    /// Paths or URLs prefetched at startup
    #[serde(default)]
    pub warmup: Vec<String>,

    /// Local content store
    #[serde(default)]
    pub store: StoreConfig,

    /// Upstream origin
    #[serde(default)]
    pub origin: OriginConfig,

    /// Transform limits
    #[serde(default)]
    pub transform: TransformConfig,

    /// Distributed tier
    #[serde(default)]
    pub tier: TierConfig,
}

impl EdgeConfig {
    /// Parse a TOML document
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::configuration(format!("Invalid TOML: {e}")))
    }

    /// Read, parse, apply environment overrides and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::io(e, path, "read config"))?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env();
        config.validate()?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Apply `EDGENODE_*` environment overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup(ENV_CACHE_DIR).filter(|v| !v.trim().is_empty()) {
            self.store.dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup(ENV_ORIGIN_URL).filter(|v| !v.trim().is_empty()) {
            self.origin.base_url = url;
            self.origin.enabled = true;
        }
    }

    /// Reject configurations the node cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.store.capacity_bytes == 0 {
            return Err(Error::configuration("store.capacity_bytes must be greater than 0"));
        }
        if self.origin.enabled {
            let url = self.origin.base_url.trim();
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::configuration(format!(
                    "origin.base_url must be an http(s) URL when the origin is enabled, got '{url}'"
                )));
            }
        }
        if self.origin.max_body_bytes == 0 {
            return Err(Error::configuration("origin.max_body_bytes must be greater than 0"));
        }
        if self.origin.prefetch_concurrency == 0 {
            return Err(Error::configuration("origin.prefetch_concurrency must be at least 1"));
        }
        if self.transform.max_width == 0 || self.transform.max_height == 0 {
            return Err(Error::configuration("transform.max_width and max_height must be positive"));
        }
        if !(1..=100).contains(&self.transform.default_quality) {
            return Err(Error::configuration("transform.default_quality must be between 1 and 100"));
        }
        Ok(())
    }
}
