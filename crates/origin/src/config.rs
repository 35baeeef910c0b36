//! Configuration for the origin fetch client

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Origin fetch configuration (`[origin]` section)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OriginConfig {
    /// Fetch misses from the origin
    #[serde(default)]
    pub enabled: bool,

    /// Origin base URL (e.g., "https://origin.example.com/assets")
    #[serde(default)]
    pub base_url: String,

    /// Per-attempt timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries after the first attempt for transient failures
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Backoff unit in milliseconds; attempt `n` waits `n` units before retrying
    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,

    /// Redirects followed before giving up
    #[serde(default = "default_redirect_limit")]
    pub redirect_limit: usize,

    /// If non-empty, only these extensions may be fetched
    #[serde(default)]
    pub allowed_extensions: Vec<String>,

    /// Extensions never fetched; takes precedence over the allow list
    #[serde(default)]
    pub denied_extensions: Vec<String>,

    /// Store administrative pulls in the local cache
    #[serde(default = "default_true")]
    pub cache_on_pull: bool,

    /// Largest response body accepted, in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,

    /// Concurrent pulls during prefetch
    #[serde(default = "default_prefetch_concurrency")]
    pub prefetch_concurrency: usize,

    /// User-Agent sent to the origin
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            timeout_secs: default_timeout_secs(),
            retry_attempts: default_retry_attempts(),
            backoff_unit_ms: default_backoff_unit_ms(),
            redirect_limit: default_redirect_limit(),
            allowed_extensions: Vec::new(),
            denied_extensions: Vec::new(),
            cache_on_pull: true,
            max_body_bytes: default_max_body_bytes(),
            prefetch_concurrency: default_prefetch_concurrency(),
            user_agent: default_user_agent(),
        }
    }
}

impl OriginConfig {
    /// An enabled configuration pointing at `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            enabled: true,
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Per-attempt timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Retry schedule derived from this configuration
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.backoff_unit_ms),
        )
    }
}

// Default value functions
fn default_timeout_secs() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_backoff_unit_ms() -> u64 {
    1000
}

fn default_redirect_limit() -> usize {
    5
}

fn default_true() -> bool {
    true
}

fn default_max_body_bytes() -> u64 {
    256 * 1024 * 1024
}

fn default_prefetch_concurrency() -> usize {
    4
}

fn default_user_agent() -> String {
    format!("edgenode/{}", env!("CARGO_PKG_VERSION"))
}
