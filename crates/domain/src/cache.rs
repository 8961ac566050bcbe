//! Explicit TTL cache for query results.
//!
//! Entries are keyed by query shape and expire after a fixed TTL, but the
//! primary freshness mechanism is explicit: mutation sites call
//! [`TtlCache::clear`] (or [`TtlCache::invalidate`]) so readers never
//! depend on the clock alone.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

/// A small read-through cache with per-entry expiry.
#[derive(Clone)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Arc<RwLock<HashMap<K, (Instant, V)>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    /// Creates an empty cache with the given entry lifetime.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the cached value if present and not expired.
    pub async fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some((stored_at, value)) if stored_at.elapsed() < self.ttl => Some(value.clone()),
            _ => None,
        }
    }

    /// Stores a value under the key.
    pub async fn insert(&self, key: K, value: V) {
        self.entries.write().await.insert(key, (Instant::now(), value));
    }

    /// Drops one entry.
    pub async fn invalidate(&self, key: &K) {
        self.entries.write().await.remove(key);
    }

    /// Drops every entry.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hit_within_ttl() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("k", 1).await;
        assert_eq!(cache.get(&"k").await, Some(1));
    }

    #[tokio::test]
    async fn expired_entry_misses() {
        let cache = TtlCache::new(Duration::ZERO);
        cache.insert("k", 1).await;
        assert_eq!(cache.get(&"k").await, None);
    }

    #[tokio::test]
    async fn explicit_invalidation() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("a", 1).await;
        cache.insert("b", 2).await;

        cache.invalidate(&"a").await;
        assert_eq!(cache.get(&"a").await, None);
        assert_eq!(cache.get(&"b").await, Some(2));

        cache.clear().await;
        assert_eq!(cache.get(&"b").await, None);
    }
}
