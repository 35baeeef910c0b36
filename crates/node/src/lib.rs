//! Core of the edgenode CDN edge node
//!
//! Ties the content store, transform engine, origin client and distributed
//! tier together:
//!
//! - [`Resolver`] answers content requests for the routing layer
//! - [`EdgeNode`] owns the shared components and exposes administrative operations
//! - [`EdgeConfig`] is the TOML configuration for all of it

#![expect(
    clippy::missing_errors_doc,
    reason = "Error documentation to be added incrementally"
)]

mod admin;
pub mod config;
mod error;
mod pipeline;
pub mod tier;

pub use admin::EdgeNode;
pub use config::EdgeConfig;
pub use error::{Error, NotFoundCause, ResolveError, Result};
pub use pipeline::{CacheStatus, Resolution, Resolver, ResolverStats, ResolverStatsSnapshot};
pub use tier::{MemoryTier, NoopTier, RemoteTier, TierConfig, TierKind, TierObject};

pub use edgenode_origin::{OriginPullResult, PrefetchReport};
pub use edgenode_store::{CacheEntry, StoreStats};
pub use edgenode_transform::RawOptions;
