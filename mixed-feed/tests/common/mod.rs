#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use mixed_feed::normalize::date_field;
use mixed_feed::traits::cache_key_prefix;
use mixed_feed::{
    CacheAsideFetcher, CacheStore, FeedError, FeedSource, MemoryCache, RawItem, RawPayload, Result,
    Transport, TransportRequest, TransportResponse,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Fixed instant `seconds` after 2024-01-01T00:00:00Z.
pub fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_704_067_200 + seconds, 0).unwrap()
}

/// A raw entry in the shape stub sources understand.
pub fn raw_post(id: &str, seconds: i64) -> Value {
    json!({ "id": id, "text": format!("post {}", id), "created_at": at(seconds).to_rfc3339() })
}

#[derive(Clone)]
pub enum Behavior {
    Items(Vec<Value>),
    ErrorPayload(String),
    Slow(Duration, Vec<Value>),
}

/// In-memory source that records how it is called.
pub struct StubSource {
    provider: String,
    platform: String,
    discriminator: String,
    behavior: Behavior,
    cache: CacheAsideFetcher,
    calls: AtomicUsize,
    requested: Mutex<Vec<usize>>,
}

impl StubSource {
    pub fn new(provider: &str, platform: &str, discriminator: &str, behavior: Behavior) -> Self {
        Self {
            provider: provider.to_string(),
            platform: platform.to_string(),
            discriminator: discriminator.to_string(),
            behavior,
            cache: CacheAsideFetcher::disabled(),
            calls: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn items(discriminator: &str, items: Vec<Value>) -> Self {
        Self::new("stub", "list", discriminator, Behavior::Items(items))
    }

    pub fn failing(discriminator: &str, message: &str) -> Self {
        Self::new("stub", "broken", discriminator, Behavior::ErrorPayload(message.to_string()))
    }

    pub fn with_cache(mut self, cache: CacheAsideFetcher) -> Self {
        self.cache = cache;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested_counts(&self) -> Vec<usize> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedSource for StubSource {
    fn provider_name(&self) -> &str {
        &self.provider
    }

    fn platform_name(&self) -> &str {
        &self.platform
    }

    fn build_cache_key(&self, count: usize) -> String {
        format!(
            "{}:{}:{}",
            cache_key_prefix(&self.provider, &self.platform),
            self.discriminator,
            count
        )
    }

    fn cache(&self) -> &CacheAsideFetcher {
        &self.cache
    }

    async fn fetch_raw(&self, count: usize) -> RawPayload {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(count);
        match &self.behavior {
            Behavior::Items(items) => RawPayload::items(items.clone()),
            Behavior::ErrorPayload(message) => RawPayload::error(message.clone()),
            Behavior::Slow(delay, items) => {
                tokio::time::sleep(*delay).await;
                RawPayload::items(items.clone())
            }
        }
    }

    fn date_of(&self, item: &RawItem) -> Option<DateTime<Utc>> {
        date_field(item, "created_at")
    }

    fn canonical_message(&self, item: &RawItem) -> String {
        item.str_at("text").unwrap_or_default().to_string()
    }
}

pub enum Scripted {
    Respond(TransportResponse),
    Fail(String),
}

/// Transport that replays canned responses in order and keeps every request.
/// Once the script runs out the last entry is repeated.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn ok(body: Value) -> Arc<Self> {
        Self::new(vec![Scripted::Respond(TransportResponse::ok(body))])
    }

    pub fn status(status: u16, body: Value) -> Arc<Self> {
        Self::new(vec![Scripted::Respond(TransportResponse { status, body })])
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Self::new(vec![Scripted::Fail(message.to_string())])
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, request: &TransportRequest) -> Result<TransportResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let mut script = self.script.lock().unwrap();
        let step = if script.len() > 1 { script.pop_front() } else { None };
        let step = step.as_ref().or_else(|| script.front());
        match step {
            Some(Scripted::Respond(response)) => Ok(response.clone()),
            Some(Scripted::Fail(message)) => Err(FeedError::Transport(message.clone())),
            None => Err(FeedError::Transport("script exhausted".to_string())),
        }
    }
}

/// Wraps a `MemoryCache` and counts every access.
#[derive(Default)]
pub struct CountingCache {
    inner: MemoryCache,
    pub gets: AtomicUsize,
    pub puts: AtomicUsize,
}

impl CountingCache {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn accesses(&self) -> usize {
        self.gets.load(Ordering::SeqCst) + self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheStore for CountingCache {
    async fn has(&self, key: &str) -> bool {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.has(key).await
    }

    async fn get(&self, key: &str) -> Option<Value> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: Value, ttl_seconds: u64) {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, value, ttl_seconds).await
    }
}
