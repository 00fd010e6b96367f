use crate::cache::CacheAsideFetcher;
use crate::normalize::sort_by_date;
use crate::traits::{cache_key_prefix, FeedSource};
use crate::types::{FeedError, NormalizedItem, Result};
use futures::future::join_all;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Combines several sources into one oldest-first feed.
///
/// Every source is asked for the full `count`; the merged list is not
/// truncated. A failing source contributes a single errored item instead of
/// failing the whole call.
pub struct MixedFeed {
    sources: Vec<Arc<dyn FeedSource>>,
    cache: CacheAsideFetcher,
    feed_id: Option<String>,
    source_timeout: Option<Duration>,
}

impl MixedFeed {
    pub fn new(sources: Vec<Arc<dyn FeedSource>>, cache: CacheAsideFetcher) -> Result<Self> {
        let mut seen: HashMap<String, usize> = HashMap::new();

        for (index, source) in sources.iter().enumerate() {
            if source.provider_name().trim().is_empty() {
                return Err(FeedError::Configuration(format!(
                    "source #{} has an empty provider name",
                    index
                )));
            }

            let key = source.build_cache_key(1);
            if let Some(previous) = seen.insert(key.clone(), index) {
                return Err(FeedError::Configuration(format!(
                    "sources #{} and #{} share the cache key {}",
                    previous, index, key
                )));
            }
        }

        Ok(Self {
            sources,
            cache,
            feed_id: None,
            source_timeout: None,
        })
    }

    /// Pins the aggregate identity instead of deriving it from the sources.
    pub fn with_feed_id(mut self, feed_id: impl Into<String>) -> Self {
        self.feed_id = Some(feed_id.into()).filter(|id| !id.is_empty());
        self
    }

    /// A source that does not answer in time is treated like any other failed
    /// source.
    pub fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = Some(timeout);
        self
    }

    pub fn provider_name(&self) -> &str {
        "mixed"
    }

    pub fn platform_name(&self) -> &str {
        ""
    }

    pub fn sources(&self) -> &[Arc<dyn FeedSource>] {
        &self.sources
    }

    pub fn per_source_count(&self, count: usize) -> usize {
        count
    }

    pub fn build_cache_key(&self, count: usize) -> String {
        let identity = match &self.feed_id {
            Some(feed_id) => feed_id.clone(),
            None => {
                let per_source = self.per_source_count(count);
                let mut hasher = Sha256::new();
                for source in &self.sources {
                    hasher.update(source.build_cache_key(per_source).as_bytes());
                    hasher.update(b"\n");
                }
                hex::encode(hasher.finalize())
            }
        };

        format!(
            "{}:{}:{}",
            cache_key_prefix(self.provider_name(), self.platform_name()),
            identity,
            count
        )
    }

    pub async fn get_normalized_items(&self, count: usize) -> Vec<NormalizedItem> {
        if self.sources.is_empty() || count == 0 {
            return Vec::new();
        }

        let cache_key = self.build_cache_key(count);
        if let Some(cached) = self.cache.lookup::<Vec<NormalizedItem>>(&cache_key).await {
            debug!("Serving merged feed {} from cache", cache_key);
            return cached;
        }

        let per_source = self.per_source_count(count);
        let batches = join_all(
            self.sources
                .iter()
                .map(|source| self.fetch_source(source.as_ref(), per_source)),
        )
        .await;

        let mut merged: Vec<NormalizedItem> = batches.into_iter().flatten().collect();
        sort_by_date(&mut merged);

        let errored = merged.iter().filter(|item| item.is_errored()).count();
        info!(
            "Merged {} items from {} sources ({} errored)",
            merged.len(),
            self.sources.len(),
            errored
        );

        if let Err(e) = self.cache.store(&cache_key, &merged).await {
            warn!("Failed to cache merged feed {}: {}", cache_key, e);
        }

        merged
    }

    async fn fetch_source(&self, source: &dyn FeedSource, count: usize) -> Vec<NormalizedItem> {
        let fetch = source.get_normalized_items(count);
        let outcome = match self.source_timeout {
            Some(limit) => match tokio::time::timeout(limit, fetch).await {
                Ok(outcome) => outcome,
                Err(_) => Err(FeedError::Transport(format!("timed out after {:?}", limit))),
            },
            None => fetch.await,
        };

        match outcome {
            Ok(items) => items,
            Err(e) => {
                warn!(
                    "Source {} failed, substituting an errored item: {}",
                    cache_key_prefix(source.provider_name(), source.platform_name()),
                    e
                );
                let message = match e {
                    FeedError::Provider { message, .. } => message,
                    other => other.to_string(),
                };
                vec![NormalizedItem::errored(
                    source.provider_name(),
                    source.platform_name(),
                    message,
                )]
            }
        }
    }
}
