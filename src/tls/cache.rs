//! The bounded, TTL'd LRU shared by the context cache and the certificate
//! cache (spec §4.A). Eviction is hand-rolled over `indexmap::IndexMap`
//! rather than pulling in a dedicated LRU crate, matching `sqlx-core`'s own
//! preference for `indexmap` as its cache backbone.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use indexmap::IndexMap;

/// Hit/miss/eviction counters, read with relaxed atomics (spec §4.A
/// "Access counters and hit/miss statistics are exposed for observability").
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

/// Point-in-time snapshot of [`CacheStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    fn record_expiration(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}

struct Entry<T> {
    value: T,
    created_at: Instant,
}

/// A bounded LRU with a per-entry TTL. Entries are evicted for capacity
/// (oldest-inserted-first, once full) and lazily for expiry (checked on
/// `get`). A construction failure is never cached (spec §4.A "Failure
/// semantics").
pub struct TtlLruCache<T> {
    entries: std::sync::Mutex<IndexMap<String, Entry<T>>>,
    capacity: usize,
    ttl: Duration,
    stats: CacheStats,
}

impl<T: Clone> TtlLruCache<T> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        TtlLruCache {
            entries: std::sync::Mutex::new(IndexMap::new()),
            capacity,
            ttl,
            stats: CacheStats::default(),
        }
    }

    pub fn get(&self, key: &str) -> Option<T> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.created_at.elapsed() <= self.ttl => {
                self.stats.record_hit();
                let value = entry.value.clone();
                // Move-to-back keeps the front of the map the least-recently-used.
                entries.shift_remove(key);
                entries.insert(key.to_string(), Entry {
                    value: value.clone(),
                    created_at: Instant::now(),
                });
                Some(value)
            }
            Some(_) => {
                entries.shift_remove(key);
                self.stats.record_expiration();
                self.stats.record_miss();
                None
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    pub fn put(&self, key: String, value: T) {
        let mut entries = self.entries.lock().unwrap();
        entries.shift_remove(&key);
        while entries.len() >= self.capacity {
            if entries.shift_remove_index(0).is_some() {
                self.stats.record_eviction();
            } else {
                break;
            }
        }
        entries.insert(key, Entry { value, created_at: Instant::now() });
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_hits() {
        let cache: TtlLruCache<String> = TtlLruCache::new(2, Duration::from_secs(60));
        cache.put("a".to_string(), "A".to_string());
        assert_eq!(cache.get("a"), Some("A".to_string()));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn miss_on_unknown_key() {
        let cache: TtlLruCache<String> = TtlLruCache::new(2, Duration::from_secs(60));
        assert_eq!(cache.get("missing"), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn evicts_oldest_when_over_capacity() {
        let cache: TtlLruCache<String> = TtlLruCache::new(2, Duration::from_secs(60));
        cache.put("a".to_string(), "A".to_string());
        cache.put("b".to_string(), "B".to_string());
        cache.put("c".to_string(), "C".to_string());
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("c"), Some("C".to_string()));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn expired_entry_counts_as_miss() {
        let cache: TtlLruCache<String> = TtlLruCache::new(2, Duration::from_millis(0));
        cache.put("a".to_string(), "A".to_string());
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.stats().expirations, 1);
    }
}
