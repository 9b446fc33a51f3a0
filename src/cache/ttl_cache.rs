use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::helpers::schedule::PeriodicTask;
use crate::helpers::time::SharedClock;
use crate::observability::metrics::get_metrics;

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub inserted_at: DateTime<Utc>,
}

/// Expiring key -> value store. A zero ttl turns it into a pass-through.
#[derive(Debug, Clone)]
pub struct TtlCache<K, V> {
    name: &'static str,
    ttl: chrono::Duration,
    clock: SharedClock,
    inner: Arc<RwLock<HashMap<K, CacheEntry<V>>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, ttl: chrono::Duration, clock: SharedClock) -> Self {
        Self {
            name,
            ttl,
            clock,
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.ttl > chrono::Duration::zero()
    }

    fn is_fresh(&self, entry: &CacheEntry<V>, now: DateTime<Utc>) -> bool {
        now - entry.inserted_at <= self.ttl
    }

    /// Value for `key` if it is younger than the ttl. Stale entries are evicted.
    pub async fn get(&self, key: &K) -> Option<V> {
        if !self.is_enabled() {
            return None;
        }
        let now = self.clock.now();
        {
            let map = self.inner.read().await;
            match map.get(key) {
                Some(entry) if self.is_fresh(entry, now) => {
                    self.record("hit").await;
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => {
                    self.record("miss").await;
                    return None;
                }
            }
        }

        let mut map = self.inner.write().await;
        // re-check, a writer may have replaced the entry meanwhile
        if map.get(key).is_some_and(|entry| !self.is_fresh(entry, now)) {
            map.remove(key);
            debug!(cache = self.name, ?key, "evicted stale entry on read");
            get_metrics().await.cache_evictions.inc();
        }
        self.record("stale").await;
        None
    }

    pub async fn set(&self, key: K, value: V) {
        if !self.is_enabled() {
            return;
        }
        let entry = CacheEntry { value, inserted_at: self.clock.now() };
        self.inner.write().await.insert(key, entry);
    }

    pub async fn invalidate(&self, key: &K) -> bool {
        self.inner.write().await.remove(key).is_some()
    }

    /// Drop every entry older than the ttl. Returns how many were removed.
    pub async fn invalidate_expired(&self) -> usize {
        let now = self.clock.now();
        let mut map = self.inner.write().await;
        let before = map.len();
        map.retain(|_, entry| now - entry.inserted_at <= self.ttl);
        let removed = before - map.len();
        if removed > 0 {
            get_metrics().await.cache_evictions.inc_by(removed as u64);
            info!(cache = self.name, removed, remaining = map.len(), "expired cache entries swept");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Cached value for `key`, or the producer's value which is then stored.
    /// Producer errors are returned as-is and nothing is stored.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: K, producer: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key).await {
            return Ok(value);
        }
        let value = producer().await?;
        self.set(key, value.clone()).await;
        Ok(value)
    }

    /// Sweep expired entries on a fixed schedule, independent of traffic.
    pub fn start_sweeper(&self, period: Duration) -> PeriodicTask {
        let cache = self.clone();
        PeriodicTask::start(self.name, period, move || {
            let cache = cache.clone();
            async move {
                cache.invalidate_expired().await;
            }
        })
    }

    async fn record(&self, result: &str) {
        get_metrics()
            .await
            .cache_lookups
            .with_label_values(&[self.name, result])
            .inc();
    }
}
