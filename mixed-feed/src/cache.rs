use crate::types::{Result, DEFAULT_TTL_SECONDS};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Key/value store shared by every source and by the aggregator.
///
/// Implementations only need atomic single-key puts; nothing here relies on
/// transactions or versioning.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn has(&self, key: &str) -> bool;

    async fn get(&self, key: &str) -> Option<Value>;

    async fn put(&self, key: &str, value: Value, ttl_seconds: u64);
}

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-process TTL store.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Drops expired entries. Every `put` does the same; this is for callers
    /// that stop writing but want the memory back.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.read().await;
        entries.values().filter(|entry| entry.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn has(&self, key: &str) -> bool {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .map(|entry| entry.is_live(Instant::now()))
            .unwrap_or(false)
    }

    async fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.is_live(Instant::now()))
            .map(|entry| entry.value.clone())
    }

    async fn put(&self, key: &str, value: Value, ttl_seconds: u64) {
        let now = Instant::now();
        let expires_at = now + Duration::from_secs(ttl_seconds);
        let mut entries = self.entries.write().await;
        // Writes already hold the lock, so expired entries go here.
        entries.retain(|_, entry| entry.is_live(now));
        entries.insert(key.to_string(), CacheEntry { value, expires_at });
    }
}

/// Fetch-with-cache wrapper used by every source and by the aggregator.
///
/// A live entry is returned verbatim. On a miss the producer runs once and its
/// result is stored only when it succeeds. Concurrent misses on the same key
/// may each run the producer.
#[derive(Clone)]
pub struct CacheAsideFetcher {
    store: Option<Arc<dyn CacheStore>>,
    ttl_seconds: u64,
}

impl CacheAsideFetcher {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store: Some(store),
            ttl_seconds: DEFAULT_TTL_SECONDS,
        }
    }

    /// Every call goes straight to the producer.
    pub fn disabled() -> Self {
        Self {
            store: None,
            ttl_seconds: DEFAULT_TTL_SECONDS,
        }
    }

    pub fn with_ttl(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub async fn get<T, F, Fut>(&self, key: &str, producer: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(cached) = self.lookup(key).await {
            return Ok(cached);
        }

        let produced = producer().await?;
        self.store(key, &produced).await?;
        Ok(produced)
    }

    pub async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let store = self.store.as_ref()?;
        let value = store.get(key).await?;
        match serde_json::from_value(value) {
            Ok(cached) => {
                debug!("Cache hit: {}", key);
                Some(cached)
            }
            Err(e) => {
                warn!("Ignoring unreadable cache entry {}: {}", key, e);
                None
            }
        }
    }

    pub async fn store<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        if let Some(store) = &self.store {
            let encoded = serde_json::to_value(value)?;
            store.put(key, encoded, self.ttl_seconds).await;
            debug!("Cached {} for {}s", key, self.ttl_seconds);
        }
        Ok(())
    }
}

impl std::fmt::Debug for CacheAsideFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheAsideFetcher")
            .field("enabled", &self.is_enabled())
            .field("ttl_seconds", &self.ttl_seconds)
            .finish()
    }
}
