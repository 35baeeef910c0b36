//! The assembled edge node and its administrative operations

use crate::config::EdgeConfig;
use crate::error::Result;
use crate::pipeline::Resolver;
use crate::tier::RemoteTier;
use edgenode_origin::mime::extension_for;
use edgenode_origin::{OriginClient, OriginPullResult, PrefetchReport};
use edgenode_store::{CacheEntry, ContentStore, StoreStats, integrity_tag};
use edgenode_transform::{TransformEngine, is_derived_key};
use std::sync::Arc;
use tracing::{info, warn};

/// Hex characters of the content digest used as an upload key
const UPLOAD_KEY_LEN: usize = 16;

/// Owns the shared components of one edge node
#[derive(Debug)]
pub struct EdgeNode {
    config: EdgeConfig,
    store: Arc<ContentStore>,
    origin: Arc<OriginClient>,
    tier: Arc<dyn RemoteTier>,
    resolver: Arc<Resolver>,
}

impl EdgeNode {
    /// Open the store (running recovery) and wire every component
    pub async fn start(config: EdgeConfig) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(ContentStore::open(config.store.clone()).await?);
        let origin = Arc::new(OriginClient::new(config.origin.clone())?);
        let tier = config.tier.build();
        info!(
            origin = origin.is_enabled(),
            tier = tier.name(),
            "Edge node started"
        );
        Ok(Self::from_parts(config, store, origin, tier))
    }

    /// Assemble a node from already constructed components
    pub fn from_parts(
        config: EdgeConfig,
        store: Arc<ContentStore>,
        origin: Arc<OriginClient>,
        tier: Arc<dyn RemoteTier>,
    ) -> Self {
        let engine = Arc::new(TransformEngine::new(config.transform.clone()));
        let resolver = Arc::new(Resolver::new(
            Arc::clone(&store),
            Arc::clone(&origin),
            Arc::clone(&tier),
            engine,
        ));
        Self {
            config,
            store,
            origin,
            tier,
            resolver,
        }
    }

    /// Node configuration
    #[must_use]
    pub fn config(&self) -> &EdgeConfig {
        &self.config
    }

    /// The local content store
    #[must_use]
    pub fn store(&self) -> &Arc<ContentStore> {
        &self.store
    }

    /// The resolution pipeline, for the routing layer
    #[must_use]
    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    /// Store uploaded bytes under a content-derived key
    pub async fn upload(&self, bytes: &[u8], content_type: &str) -> Result<CacheEntry> {
        let digest = integrity_tag(bytes);
        let key = match extension_for(content_type) {
            Some(ext) => format!("{}.{ext}", &digest[..UPLOAD_KEY_LEN]),
            None => digest[..UPLOAD_KEY_LEN].to_string(),
        };
        let entry = self.store.put(&key, bytes, content_type).await?;
        info!(key = %entry.key, size = entry.size, "Stored upload");
        Ok(entry)
    }

    /// Remove one key locally and from the distributed tier
    pub async fn delete(&self, key: &str) -> bool {
        let existed = self.store.delete(key).await;
        self.tier.delete(key).await;
        existed
    }

    /// Remove everything locally and flush the distributed tier
    pub async fn purge(&self) -> Result<usize> {
        let removed = self.store.purge().await?;
        self.tier.flush().await;
        Ok(removed)
    }

    /// Remove every key fully matching `pattern`
    pub async fn invalidate(&self, pattern: &str) -> Result<usize> {
        let keys = self.store.invalidate_keys(pattern)?;
        for key in &keys {
            self.tier.delete(key).await;
        }
        Ok(keys.len())
    }

    /// Local store capacity summary
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    /// Fetch one path from the origin, caching it when `cache_on_pull` is set
    pub async fn origin_pull(&self, path: &str) -> Result<OriginPullResult> {
        let mut result = self.origin.pull(path).await?;
        if self.config.origin.cache_on_pull {
            self.land(&mut result).await;
        }
        Ok(result)
    }

    /// Fetch and cache every item
    pub async fn prefetch<I, S>(&self, items: I) -> PrefetchReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut report = self.origin.prefetch(items).await;
        for result in report.results.iter_mut().filter(|r| r.success) {
            self.land(result).await;
        }
        report
    }

    /// Persist the index for a clean shutdown
    pub async fn shutdown(&self) -> Result<()> {
        self.store.close().await?;
        Ok(())
    }

    async fn land(&self, result: &mut OriginPullResult) {
        if is_derived_key(&result.key) {
            warn!(key = %result.key, "Not caching origin content under a reserved derived key");
            return;
        }
        match self
            .store
            .put(&result.key, &result.body, &result.content_type)
            .await
        {
            Ok(_) => result.cached = true,
            Err(err) => warn!(key = %result.key, error = %err, "Failed to cache origin content"),
        }
    }
}
