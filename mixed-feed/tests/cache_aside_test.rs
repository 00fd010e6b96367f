mod common;

use common::{init_tracing, CountingCache};
use mixed_feed::{CacheAsideFetcher, CacheStore, FeedError, MemoryCache};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn test_miss_runs_producer_once_and_stores() {
    init_tracing();

    let store = MemoryCache::shared();
    let fetcher = CacheAsideFetcher::new(store.clone());
    let calls = &AtomicUsize::new(0);

    let first: Vec<String> = assert_ok!(
        fetcher
            .get("stub:list:a:5", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec!["one".to_string(), "two".to_string()])
            })
            .await
    );
    assert_eq!(first, vec!["one", "two"]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(store.has("stub:list:a:5").await);

    let second: Vec<String> = assert_ok!(
        fetcher
            .get("stub:list:a:5", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec!["fresh".to_string()])
            })
            .await
    );
    assert_eq!(second, first, "a live entry is returned verbatim");
    assert_eq!(calls.load(Ordering::SeqCst), 1, "producer must not run on a hit");
}

#[tokio::test]
async fn test_failed_producer_is_not_cached() {
    init_tracing();

    let store = MemoryCache::shared();
    let fetcher = CacheAsideFetcher::new(store.clone());

    let failed = fetcher
        .get::<Vec<String>, _, _>("stub:broken:x:5", move || async move {
            Err(FeedError::Transport("connection reset".to_string()))
        })
        .await;
    assert_err!(&failed);
    assert!(!store.has("stub:broken:x:5").await);

    let retried: Vec<String> = assert_ok!(
        fetcher
            .get("stub:broken:x:5", move || async move { Ok(vec!["recovered".to_string()]) })
            .await
    );
    assert_eq!(retried, vec!["recovered"]);
}

#[tokio::test]
async fn test_empty_result_is_a_valid_entry() {
    let store = CountingCache::shared();
    let fetcher = CacheAsideFetcher::new(store.clone());
    let calls = &AtomicUsize::new(0);

    for _ in 0..2 {
        let items: Vec<u32> = fetcher
            .get("stub:list:empty:5", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::new())
            })
            .await
            .unwrap();
        assert!(items.is_empty());
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.puts.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_entry_expires_after_ttl() {
    let store: Arc<MemoryCache> = MemoryCache::shared();
    let fetcher = CacheAsideFetcher::new(store.clone()).with_ttl(60);
    let calls = &AtomicUsize::new(0);
    let produce = move || async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(calls.load(Ordering::SeqCst))
    };

    assert_eq!(fetcher.get("k", produce).await.unwrap(), 1);
    tokio::time::advance(Duration::from_secs(59)).await;
    assert_eq!(fetcher.get("k", produce).await.unwrap(), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(!store.has("k").await);
    assert_eq!(fetcher.get("k", produce).await.unwrap(), 2);
    assert_eq!(store.purge_expired().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_purge_drops_only_expired_entries() {
    let store = MemoryCache::new();
    store.put("short", serde_json::json!(1), 10).await;
    store.put("long", serde_json::json!(2), 100).await;

    tokio::time::advance(Duration::from_secs(11)).await;

    assert_eq!(store.len().await, 1);
    assert_eq!(store.purge_expired().await, 1);
    assert_eq!(store.get("long").await, Some(serde_json::json!(2)));
    assert_eq!(store.get("short").await, None);
}

#[tokio::test(start_paused = true)]
async fn test_put_drops_expired_entries() {
    let store = MemoryCache::new();
    store.put("stub:list:old:5", serde_json::json!([1]), 10).await;

    tokio::time::advance(Duration::from_secs(11)).await;
    store.put("stub:list:new:5", serde_json::json!([2]), 10).await;

    assert_eq!(store.purge_expired().await, 0, "the write already dropped it");
    assert_eq!(store.len().await, 1);
    assert!(store.has("stub:list:new:5").await);
}

#[tokio::test]
async fn test_disabled_fetcher_always_produces() {
    let fetcher = CacheAsideFetcher::disabled();
    let calls = &AtomicUsize::new(0);

    for _ in 0..3 {
        let value: u8 = fetcher
            .get("k", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    assert!(!fetcher.is_enabled());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}
