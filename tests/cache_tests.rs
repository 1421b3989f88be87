//! Read-through cache semantics

use async_trait::async_trait;
use rolnodb::{CollectionSource, ReadThroughCache, Result};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Counts how often the cache goes to the backing store.
#[derive(Default)]
struct CountingSource {
    loads: AtomicUsize,
}

impl CountingSource {
    fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CollectionSource for CountingSource {
    async fn load_all(&self) -> Result<Arc<Value>> {
        let n = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Arc::new(json!([{"id": 1, "load": n}])))
    }
}

const TTL: Duration = Duration::from_secs(300);

#[tokio::test]
async fn test_back_to_back_reads_hit_source_once() {
    let cache = ReadThroughCache::new(CountingSource::default(), TTL);

    let first = cache.get_all().await.unwrap();
    let second = cache.get_all().await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.source().loads(), 1);
}

#[tokio::test]
async fn test_invalidate_forces_fresh_read() {
    let cache = ReadThroughCache::new(CountingSource::default(), TTL);
    cache.get_all().await.unwrap();

    cache.invalidate_cache().await;
    assert!(!cache.is_valid().await);

    let value = cache.get_all().await.unwrap();
    assert_eq!(cache.source().loads(), 2);
    assert_eq!(value[0]["load"], 2);
}

#[tokio::test(start_paused = true)]
async fn test_entry_expires_after_ttl() {
    let cache = ReadThroughCache::new(CountingSource::default(), TTL);
    cache.get_all().await.unwrap();

    tokio::time::advance(TTL - Duration::from_secs(1)).await;
    cache.get_all().await.unwrap();
    assert_eq!(cache.source().loads(), 1);

    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(!cache.is_valid().await);
    cache.get_all().await.unwrap();
    assert_eq!(cache.source().loads(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cache_status_reports_state() {
    let cache = ReadThroughCache::new(CountingSource::default(), TTL);
    let empty = cache.cache_status().await;
    assert!(!empty.has_cached_data);
    assert_eq!(empty.expires_in, None);

    cache.get_all().await.unwrap();
    tokio::time::advance(Duration::from_secs(60)).await;
    let status = cache.cache_status().await;
    assert!(status.has_cached_data && status.is_valid);
    assert_eq!(status.cached_count, 1);
    assert_eq!(status.expires_in, Some(TTL - Duration::from_secs(60)));

    tokio::time::advance(TTL).await;
    let stale = cache.cache_status().await;
    assert!(stale.has_cached_data);
    assert!(!stale.is_valid);
}

#[tokio::test]
async fn test_force_refresh_reloads() {
    let cache = ReadThroughCache::new(Arc::new(CountingSource::default()), TTL);
    cache.get_all().await.unwrap();
    let refreshed = cache.force_refresh_cache().await.unwrap();
    assert_eq!(refreshed[0]["load"], 2);
    assert!(cache.is_valid().await);
}
