//! Origin fetch client for edgenode
//!
//! Pulls content missing from the local cache from an upstream HTTP origin:
//! - Extension allow/deny policy, deny list first
//! - Path normalization that never escapes the configured base URL
//! - Per-attempt timeouts and linear backoff for 5xx, timeouts and
//!   connection failures
//! - Bounded redirects
//! - Ordered, bounded-concurrency prefetch

#![expect(
    clippy::missing_errors_doc,
    reason = "Error documentation to be added incrementally"
)]

mod client;
mod config;
mod error;
pub mod mime;
mod policy;
mod retry;

pub use client::{OriginClient, OriginPullResult, PrefetchReport};
pub use config::OriginConfig;
pub use error::{Error, Result};
pub use policy::{ExtensionPolicy, NormalizedPath, extension_of, normalize_path};
pub use retry::{AttemptError, RetryPolicy};
