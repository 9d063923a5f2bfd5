use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Default number of entries held in process
pub const DEFAULT_CAPACITY: usize = 100;

/// A cached value with its insertion time and time-to-live
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub data: T,
    pub created_at: Instant,
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, ttl: Duration) -> Self {
        Self {
            data,
            created_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed() >= self.ttl
    }
}

/// Counters exposed for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped to stay within capacity
    pub evictions: u64,
    /// Entries dropped because their TTL elapsed
    pub expirations: u64,
    pub entries: usize,
}

struct Inner {
    entries: HashMap<String, CacheEntry<Value>>,
    /// Keys in insertion order, oldest first
    order: VecDeque<String>,
    stats: CacheStats,
}

impl Inner {
    fn remove(&mut self, key: &str) -> Option<CacheEntry<Value>> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.order.retain(|k| k != key);
        }
        removed
    }
}

/// Bounded in-process cache with per-entry TTL.
///
/// This tier never touches disk. When an insert pushes the cache past its
/// capacity the oldest-inserted entry is evicted, regardless of how recently
/// it was read. Values of any serializable type share one cache and are
/// partitioned by namespace.
pub struct TieredCache {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl Default for TieredCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl TieredCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                stats: CacheStats::default(),
            }),
            capacity: capacity.max(1),
        }
    }

    fn full_key(namespace: &str, key: &str) -> String {
        format!("{}:{}", namespace, key)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave the map half-written,
        // so a poisoned guard is still usable.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores a value, replacing any previous entry under the same key.
    ///
    /// A replaced entry counts as a fresh insertion for eviction order.
    pub fn set<T: Serialize>(&self, namespace: &str, key: &str, value: &T, ttl: Duration) {
        let data = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, namespace, "Cache serialization error");
                return;
            }
        };

        let full_key = Self::full_key(namespace, key);
        let mut inner = self.lock();
        inner.remove(&full_key);
        inner
            .entries
            .insert(full_key.clone(), CacheEntry::new(data, ttl));
        inner.order.push_back(full_key);

        while inner.entries.len() > self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
            inner.stats.evictions += 1;
            tracing::debug!(key = %oldest, "Evicted oldest cache entry");
        }
        inner.stats.entries = inner.entries.len();
    }

    /// Returns the value if present and still within its TTL.
    ///
    /// Expired entries are removed on the way out and reported as a miss.
    pub fn get<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Option<T> {
        let full_key = Self::full_key(namespace, key);
        let mut inner = self.lock();

        let Some(expired) = inner.entries.get(&full_key).map(|e| e.is_expired()) else {
            inner.stats.misses += 1;
            return None;
        };

        if expired {
            inner.remove(&full_key);
            inner.stats.expirations += 1;
            inner.stats.misses += 1;
            inner.stats.entries = inner.entries.len();
            return None;
        }

        let data = inner.entries.get(&full_key).map(|e| e.data.clone())?;
        match serde_json::from_value(data) {
            Ok(value) => {
                inner.stats.hits += 1;
                Some(value)
            }
            Err(e) => {
                tracing::warn!(error = %e, key = %full_key, "Dropping undecodable cache entry");
                inner.remove(&full_key);
                inner.stats.misses += 1;
                inner.stats.entries = inner.entries.len();
                None
            }
        }
    }

    /// Removes one key.
    pub fn invalidate(&self, namespace: &str, key: &str) {
        let mut inner = self.lock();
        inner.remove(&Self::full_key(namespace, key));
        inner.stats.entries = inner.entries.len();
    }

    /// Drops every entry of `namespace`, or everything when `None`.
    pub fn clear(&self, namespace: Option<&str>) {
        let mut inner = self.lock();
        match namespace {
            Some(ns) => {
                let prefix = format!("{}:", ns);
                inner.entries.retain(|k, _| !k.starts_with(&prefix));
                inner.order.retain(|k| !k.starts_with(&prefix));
            }
            None => {
                inner.entries.clear();
                inner.order.clear();
            }
        }
        inner.stats.entries = inner.entries.len();
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_get_returns_fresh_value() {
        let cache = TieredCache::default();
        cache.set("search", "dune", &vec!["a".to_string()], HOUR);

        let value: Option<Vec<String>> = cache.get("search", "dune");
        assert_eq!(value, Some(vec!["a".to_string()]));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_insertion_order_eviction_at_capacity() {
        let cache = TieredCache::new(3);
        for key in ["k1", "k2", "k3", "k4"] {
            cache.set("ns", key, &key.to_string(), HOUR);
        }

        assert_eq!(cache.get::<String>("ns", "k1"), None);
        assert_eq!(cache.get::<String>("ns", "k2").as_deref(), Some("k2"));
        assert_eq!(cache.get::<String>("ns", "k3").as_deref(), Some("k3"));
        assert_eq!(cache.get::<String>("ns", "k4").as_deref(), Some("k4"));
        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_reads_do_not_protect_from_eviction() {
        let cache = TieredCache::new(2);
        cache.set("ns", "a", &1, HOUR);
        cache.set("ns", "b", &2, HOUR);
        // An access-order cache would now evict "b"
        assert_eq!(cache.get::<i32>("ns", "a"), Some(1));
        cache.set("ns", "c", &3, HOUR);

        assert_eq!(cache.get::<i32>("ns", "a"), None);
        assert_eq!(cache.get::<i32>("ns", "b"), Some(2));
    }

    #[test]
    fn test_expired_entry_is_evicted_and_missed() {
        let cache = TieredCache::default();
        cache.set("ns", "gone", &42, Duration::ZERO);

        assert_eq!(cache.get::<i32>("ns", "gone"), None);
        let stats = cache.stats();
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.entries, 0);
    }

    #[test]
    fn test_entry_expires_after_ttl_elapses() {
        let cache = TieredCache::default();
        cache.set("ns", "short", &1, Duration::from_millis(20));
        assert_eq!(cache.get::<i32>("ns", "short"), Some(1));

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get::<i32>("ns", "short"), None);
    }

    #[test]
    fn test_namespaces_are_isolated_and_clearable() {
        let cache = TieredCache::default();
        cache.set("chat", "k", &"reply", HOUR);
        cache.set("search", "k", &"results", HOUR);

        cache.clear(Some("chat"));
        assert_eq!(cache.get::<String>("chat", "k"), None);
        assert_eq!(cache.get::<String>("search", "k").as_deref(), Some("results"));

        cache.clear(None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_type_mismatch_is_a_miss() {
        let cache = TieredCache::default();
        cache.set("ns", "k", &"not a number", HOUR);
        assert_eq!(cache.get::<u64>("ns", "k"), None);
        assert!(cache.is_empty());
    }
}
