use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Concurrent read-through cache with per-entry expiry.
///
/// Entries are evicted lazily on access; the cache is purely an optimization
/// over the durable store and may be dropped wholesale at any time without
/// affecting correctness.
pub struct TtlCache<K, V> {
    entries: DashMap<K, Expiring<V>>,
    ttl: Duration,
}

struct Expiring<V> {
    value: V,
    expires_at: Instant,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Create a cache whose entries live for `ttl` after insertion.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Fetch a live entry, evicting it first when it has expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    /// Insert or refresh an entry with the cache's default TTL.
    ///
    /// Also sweeps expired entries; writes are the only reliable eviction
    /// point for keys that are never read again.
    pub fn put(&self, key: K, value: V) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
        self.entries.insert(
            key,
            Expiring {
                value,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Drop an entry, forcing the next read through to the store.
    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }
}
