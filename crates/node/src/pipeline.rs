//! Per-request resolution across tiers
//!
//! Order of lookups for a base key and raw options:
//!
//! 1. Distributed tier, on the effective (possibly derived) key
//! 2. Local store, on the effective key
//! 3. Local store, on the base key, then transform
//! 4. Origin, then transform when options were given
//!
//! Anything else ends in [`ResolveError::NotFound`].
//!
//! Base keys are normalized the way the origin client normalizes paths, so
//! `/a/./b.png` and `a/b.png` share one entry with administrative pulls.

use crate::error::{Error, NotFoundCause, ResolveError};
use crate::tier::{RemoteTier, TierObject};
use bytes::Bytes;
use edgenode_origin::{OriginClient, normalize_path};
use edgenode_store::{CacheEntry, ContentStore, PutOptions, integrity_tag};
use edgenode_transform::{
    RawOptions, TransformEngine, TransformOptions, derive_key, is_derived_key, parse_options,
};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// How a response was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheStatus {
    /// Served from a cache tier as stored
    Hit,
    /// A cached transform output was served
    TransformedHit,
    /// A cached source was transformed for this request
    Transformed,
    /// Fetched from the origin (and transformed if requested)
    MissServedFromOrigin,
    /// Nothing could be served
    NotFound,
}

impl CacheStatus {
    /// Header-style representation
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::TransformedHit => "TRANSFORMED_HIT",
            Self::Transformed => "TRANSFORMED",
            Self::MissServedFromOrigin => "MISS_SERVED_FROM_ORIGIN",
            Self::NotFound => "NOT_FOUND",
        }
    }
}

impl ResolveError {
    /// Status reported for a failed resolution
    #[must_use]
    pub fn status(&self) -> CacheStatus {
        CacheStatus::NotFound
    }
}

/// Content served for one request
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Key the bytes belong to (derived when options were given)
    pub key: String,
    /// Content
    pub bytes: Bytes,
    /// MIME type of `bytes`
    pub content_type: String,
    /// Hex SHA-256 of `bytes`
    pub integrity_tag: String,
    /// How the content was produced
    pub status: CacheStatus,
    /// Stored entry, when the content is in the local store
    pub entry: Option<CacheEntry>,
}

impl Resolution {
    fn from_entry(entry: CacheEntry, bytes: Bytes, status: CacheStatus) -> Self {
        Self {
            key: entry.key.clone(),
            content_type: entry.content_type.clone(),
            integrity_tag: entry.integrity_tag.clone(),
            bytes,
            status,
            entry: Some(entry),
        }
    }

    /// Quoted `ETag` header value
    #[must_use]
    pub fn etag(&self) -> String {
        format!("\"{}\"", &self.integrity_tag[..self.integrity_tag.len().min(32)])
    }
}

/// Outcome counters
#[derive(Debug, Default)]
pub struct ResolverStats {
    remote_hits: AtomicU64,
    local_hits: AtomicU64,
    transforms: AtomicU64,
    origin_fetches: AtomicU64,
    not_found: AtomicU64,
}

/// Point-in-time copy of [`ResolverStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolverStatsSnapshot {
    /// Requests served by the distributed tier
    pub remote_hits: u64,
    /// Requests served from the local store as stored
    pub local_hits: u64,
    /// Transforms performed
    pub transforms: u64,
    /// Origin fetches attempted
    pub origin_fetches: u64,
    /// Requests that ended in `NotFound`
    pub not_found: u64,
}

impl ResolverStats {
    /// Copy the current counters
    #[must_use]
    pub fn snapshot(&self) -> ResolverStatsSnapshot {
        ResolverStatsSnapshot {
            remote_hits: self.remote_hits.load(Ordering::Relaxed),
            local_hits: self.local_hits.load(Ordering::Relaxed),
            transforms: self.transforms.load(Ordering::Relaxed),
            origin_fetches: self.origin_fetches.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Resolves requests against the tiers, the origin and the transform engine
#[derive(Debug)]
pub struct Resolver {
    store: Arc<ContentStore>,
    origin: Arc<OriginClient>,
    tier: Arc<dyn RemoteTier>,
    engine: Arc<TransformEngine>,
    stats: ResolverStats,
}

impl Resolver {
    /// Wire a resolver over shared components
    pub fn new(
        store: Arc<ContentStore>,
        origin: Arc<OriginClient>,
        tier: Arc<dyn RemoteTier>,
        engine: Arc<TransformEngine>,
    ) -> Self {
        Self {
            store,
            origin,
            tier,
            engine,
            stats: ResolverStats::default(),
        }
    }

    /// Outcome counters
    #[must_use]
    pub fn stats(&self) -> ResolverStatsSnapshot {
        self.stats.snapshot()
    }

    /// Serve `request` (a path, optionally with a query) under the given raw
    /// transform options
    pub async fn resolve(
        &self,
        request: &str,
        raw: &RawOptions,
    ) -> Result<Resolution, ResolveError> {
        let normalized = normalize_path(request);
        let base_key = normalized.key.as_str();
        if base_key.is_empty() || is_derived_key(base_key) {
            return Err(self.not_found(request, NotFoundCause::InvalidKey, None));
        }

        let options = parse_options(raw, self.engine.config());
        let key = options
            .as_ref()
            .map_or_else(|| base_key.to_string(), |opts| derive_key(base_key, opts));
        let hit_status = if options.is_some() {
            CacheStatus::TransformedHit
        } else {
            CacheStatus::Hit
        };

        if let Some(object) = self.tier.get(&key).await {
            bump(&self.stats.remote_hits);
            debug!(key = %key, tier = self.tier.name(), "Served from distributed tier");
            return Ok(Resolution::from_entry(object.entry, object.body, hit_status));
        }

        if let Some((entry, bytes)) = self.local(&key).await {
            bump(&self.stats.local_hits);
            debug!(key = %key, status = hit_status.as_str(), "Served from local store");
            return Ok(Resolution::from_entry(entry, bytes, hit_status));
        }

        if let Some(opts) = &options {
            if let Some((source, bytes)) = self.local(base_key).await {
                debug!(key = %key, base = base_key, "Transforming cached source");
                return self
                    .transform_and_land(base_key, &key, opts, bytes, &source.content_type)
                    .await
                    .map_err(|e| self.not_found(&key, NotFoundCause::TransformFailed, Some(e)));
            }
        }

        if !self.origin.is_enabled() {
            return Err(self.not_found(&key, NotFoundCause::OriginDisabled, None));
        }

        bump(&self.stats.origin_fetches);
        let pulled = match self.origin.pull(request).await {
            Ok(pulled) => pulled,
            Err(err) => {
                let cause = match &err {
                    edgenode_origin::Error::OriginNotFound { .. } => NotFoundCause::Absent,
                    _ => NotFoundCause::OriginFailed,
                };
                return Err(self.not_found(&key, cause, Some(err.into())));
            }
        };

        let stored = match self
            .store
            .put(base_key, &pulled.body, &pulled.content_type)
            .await
        {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(key = base_key, error = %err, "Failed to cache origin response, serving anyway");
                None
            }
        };

        if let Some(opts) = &options {
            let mut resolution = self
                .transform_and_land(base_key, &key, opts, pulled.body, &pulled.content_type)
                .await
                .map_err(|e| self.not_found(&key, NotFoundCause::TransformFailed, Some(e)))?;
            resolution.status = CacheStatus::MissServedFromOrigin;
            return Ok(resolution);
        }

        let integrity_tag = stored
            .as_ref()
            .map_or_else(|| integrity_tag(&pulled.body), |e| e.integrity_tag.clone());
        debug!(key = base_key, size = pulled.size, "Served from origin");
        Ok(Resolution {
            key: base_key.to_string(),
            bytes: pulled.body,
            content_type: pulled.content_type,
            integrity_tag,
            status: CacheStatus::MissServedFromOrigin,
            entry: stored,
        })
    }

    /// Local lookup; read failures count as a miss
    async fn local(&self, key: &str) -> Option<(CacheEntry, Bytes)> {
        match self.store.fetch(key).await {
            Ok(found) => found,
            Err(err) => {
                warn!(key, error = %err, "Local store read failed, treating as miss");
                None
            }
        }
    }

    /// Transform on the blocking pool, store the output as a derived entry
    /// and mirror it into the distributed tier
    async fn transform_and_land(
        &self,
        base_key: &str,
        derived_key: &str,
        options: &TransformOptions,
        source: Bytes,
        content_type: &str,
    ) -> crate::Result<Resolution> {
        let engine = Arc::clone(&self.engine);
        let options = *options;
        let source_type = content_type.to_string();
        let output = tokio::task::spawn_blocking(move || engine.apply(&source, &source_type, &options))
            .await
            .map_err(|e| Error::Task {
                message: e.to_string(),
            })??;
        bump(&self.stats.transforms);

        let entry = match self
            .store
            .put_with(
                derived_key,
                &output.bytes,
                &output.content_type,
                PutOptions::derived(base_key),
            )
            .await
        {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(key = derived_key, error = %err, "Failed to cache transform output, serving anyway");
                None
            }
        };

        if let Some(entry) = &entry {
            self.tier
                .set(TierObject {
                    entry: entry.clone(),
                    body: output.bytes.clone(),
                })
                .await;
        }

        Ok(Resolution {
            key: derived_key.to_string(),
            integrity_tag: entry
                .as_ref()
                .map_or_else(|| integrity_tag(&output.bytes), |e| e.integrity_tag.clone()),
            bytes: output.bytes,
            content_type: output.content_type,
            status: CacheStatus::Transformed,
            entry,
        })
    }

    fn not_found(&self, key: &str, cause: NotFoundCause, source: Option<Error>) -> ResolveError {
        bump(&self.stats.not_found);
        match &source {
            Some(err) => debug!(key, cause = %cause, error = %err, "Resolution failed"),
            None => debug!(key, cause = %cause, "Resolution failed"),
        }
        ResolveError::NotFound {
            key: key.to_string(),
            cause,
            source: source.map(Box::new),
        }
    }
}
