//! A TTL cache keyed by an arbitrary `Ord + Clone` key, with single-flight
//! coalescing of concurrent fetches for the same key.
//!
//! Replaces the "caching decorator with hidden TTL" pattern flagged in
//! Design Notes §9: the TTL is an explicit constructor parameter, and
//! `invalidate`/`invalidate_all` give `refresh` a precise way to drop
//! entries. Uses `tokio::time::Instant` rather than `std::time::Instant` so
//! tests can drive expiry deterministically with `tokio::time::pause` +
//! `tokio::time::advance` instead of sleeping in real time.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::error::Result;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// A single-flight, TTL-expiring cache.
pub struct Cache<K, V> {
    ttl: Duration,
    entries: RwLock<HashMap<K, Entry<V>>>,
    inflight: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new(ttl: Duration) -> Cache<K, V> {
        Cache {
            ttl,
            entries: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached value for `key` if still fresh, otherwise calls
    /// `fetch` exactly once across any number of concurrent callers waiting
    /// on the same key, caches the result, and returns it.
    pub async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if let Some(v) = self.fresh(&key).await {
            return Ok(v);
        }

        let lock = {
            let mut inflight = self.inflight.lock().await;
            inflight
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = lock.lock().await;

        // Someone else may have just populated the entry while we waited
        // for the per-key lock: check again before calling `fetch`.
        if let Some(v) = self.fresh(&key).await {
            return Ok(v);
        }

        let value = fetch().await?;
        let expires_at = Instant::now() + self.ttl;
        self.entries.write().await.insert(
            key.clone(),
            Entry {
                value: value.clone(),
                expires_at,
            },
        );
        self.inflight.lock().await.remove(&key);
        Ok(value)
    }

    async fn fresh(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().await;
        entries.get(key).and_then(|e| {
            if e.expires_at > Instant::now() {
                Some(e.value.clone())
            } else {
                None
            }
        })
    }

    pub async fn invalidate(&self, key: &K) {
        self.entries.write().await.remove(key);
    }

    pub async fn invalidate_all(&self) {
        self.entries.write().await.clear();
    }
}
