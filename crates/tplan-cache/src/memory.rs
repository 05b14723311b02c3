use moka::future::Cache;
use std::time::Duration;
use tplan_models::CachedIndicatorEntry;

/// In-memory hot tier backed by moka.
///
/// Entries are evicted after the TTL and re-read from SQLite on the next
/// access, so entries refreshed by another process are picked up.
pub struct MemoryCache {
    inner: Cache<String, CachedIndicatorEntry>,
}

impl MemoryCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, key: &str) -> Option<CachedIndicatorEntry> {
        self.inner.get(key).await
    }

    pub async fn insert(&self, key: String, entry: CachedIndicatorEntry) {
        self.inner.insert(key, entry).await;
    }

    pub async fn invalidate(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    /// Live entry count, after applying pending evictions and invalidations.
    pub async fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks().await;
        self.inner.entry_count()
    }
}
