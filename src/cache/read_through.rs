use super::source::CollectionSource;
use crate::core::Result;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct CachedSnapshot {
    value: Arc<Value>,
    expires_at: Instant,
}

impl CachedSnapshot {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Point-in-time view of a cache, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub has_cached_data: bool,
    pub is_valid: bool,
    /// Time left before expiry; `None` when empty or already expired.
    pub expires_in: Option<Duration>,
    /// Entities in the cached snapshot (array length or object size).
    pub cached_count: usize,
}

/// TTL cache over the whole value of one collection.
///
/// Readers get the cached `Arc<Value>` while it is fresh; a miss reloads
/// from the source under the same lock, so concurrent misses share one load.
pub struct ReadThroughCache<S> {
    source: S,
    ttl: Duration,
    slot: Mutex<Option<CachedSnapshot>>,
}

impl<S: CollectionSource> ReadThroughCache<S> {
    pub fn new(source: S, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            slot: Mutex::new(None),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached value if fresh, otherwise a fresh load from the source.
    pub async fn get_all(&self) -> Result<Arc<Value>> {
        let mut slot = self.slot.lock().await;
        let now = Instant::now();
        if let Some(cached) = slot.as_ref().filter(|cached| cached.is_fresh(now)) {
            return Ok(Arc::clone(&cached.value));
        }

        let value = self.source.load_all().await?;
        debug!(ttl_secs = self.ttl.as_secs(), "cache refilled");
        *slot = Some(CachedSnapshot {
            value: Arc::clone(&value),
            expires_at: now + self.ttl,
        });
        Ok(value)
    }

    /// Drops the snapshot; the next read goes to the source.
    pub async fn invalidate_cache(&self) {
        if self.slot.lock().await.take().is_some() {
            debug!("cache invalidated");
        }
    }

    pub async fn force_refresh_cache(&self) -> Result<Arc<Value>> {
        self.invalidate_cache().await;
        self.get_all().await
    }

    pub async fn is_valid(&self) -> bool {
        self.slot
            .lock()
            .await
            .as_ref()
            .is_some_and(|cached| cached.is_fresh(Instant::now()))
    }

    pub async fn cache_status(&self) -> CacheStatus {
        let slot = self.slot.lock().await;
        let now = Instant::now();
        match slot.as_ref() {
            None => CacheStatus {
                has_cached_data: false,
                is_valid: false,
                expires_in: None,
                cached_count: 0,
            },
            Some(cached) => {
                let is_valid = cached.is_fresh(now);
                CacheStatus {
                    has_cached_data: true,
                    is_valid,
                    expires_in: is_valid.then(|| cached.expires_at - now),
                    cached_count: match cached.value.as_ref() {
                        Value::Array(items) => items.len(),
                        Value::Object(map) => map.len(),
                        _ => 0,
                    },
                }
            }
        }
    }
}
