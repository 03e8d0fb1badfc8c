//! In-memory map whose entries expire after a fixed time-to-live.

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use {dashmap::DashMap, tokio::time::Instant, tracing::debug};

struct Slot<V> {
    value: V,
    expires_at: Instant,
}

/// Expiring key/value cache.
///
/// Expired entries are never returned; [`ExpiringCache::purge_expired`]
/// (run periodically by the sweeper) reclaims their memory.
pub struct ExpiringCache<V> {
    entries: DashMap<String, Slot<V>>,
    ttl: Duration,
}

impl<V: Clone + Send + Sync + 'static> ExpiringCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Create a cache and start sweeping it every `interval`.
    ///
    /// The sweeper holds a weak reference and exits once the cache is
    /// dropped. Without a Tokio runtime no sweeper is started and expired
    /// entries are only dropped on lookup.
    pub fn with_sweeper(ttl: Duration, interval: Duration) -> Arc<Self> {
        let cache = Arc::new(Self::new(ttl));
        if interval.is_zero() {
            return cache;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(sweep(Arc::downgrade(&cache), interval));
            },
            Err(_) => debug!("no runtime, expiring cache sweeper disabled"),
        }
        cache
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Insert or overwrite `key`, resetting its expiry.
    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.entries.insert(key.into(), Slot {
            value,
            expires_at: Instant::now() + self.ttl,
        });
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(slot) if slot.expires_at > now => return Some(slot.value.clone()),
            Some(_) => {},
            None => return None,
        }
        self.entries.remove_if(key, |_, slot| slot.expires_at <= now);
        None
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.entries.remove(key).map(|(_, slot)| slot.value)
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, slot| slot.expires_at > now);
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

async fn sweep<V: Clone + Send + Sync + 'static>(cache: Weak<ExpiringCache<V>>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(cache) = cache.upgrade() else {
            break;
        };
        cache.purge_expired();
    }
}
