//! Bounded TTL cache.
//!
//! Least recently used entries are evicted at capacity; entries older than the
//! TTL are dropped on read. Time comes from the injected [`Clock`], so the
//! owner decides what "now" means.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use lru::LruCache;

use luvvix_shared::Clock;

struct Stamped<V> {
    value: V,
    stored_at: DateTime<Utc>,
}

pub struct TtlCache<K: Hash + Eq, V: Clone> {
    entries: Mutex<LruCache<K, Stamped<V>>>,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl<K: Hash + Eq, V: Clone> TtlCache<K, V> {
    /// A zero capacity is treated as one.
    pub fn new(capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            clock,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        let expired = match entries.get(key) {
            Some(entry) if now - entry.stored_at < self.ttl => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    pub fn insert(&self, key: K, value: V) {
        let stored_at = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.put(key, Stamped { value, stored_at });
    }

    pub fn invalidate(&self, key: &K) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.pop(key);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use luvvix_shared::ManualClock;

    use super::*;

    fn cache(capacity: usize, ttl_secs: u64) -> (TtlCache<&'static str, u32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let cache = TtlCache::new(capacity, Duration::from_secs(ttl_secs), clock.clone());
        (cache, clock)
    }

    #[test]
    fn entries_expire_after_ttl() {
        let (cache, clock) = cache(8, 60);
        cache.insert("alice", 1);

        clock.advance(chrono::Duration::seconds(59));
        assert_eq!(cache.get(&"alice"), Some(1));

        clock.advance(chrono::Duration::seconds(1));
        assert_eq!(cache.get(&"alice"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn least_recently_used_is_evicted() {
        let (cache, _clock) = cache(2, 60);
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.get(&"a"), Some(1));

        cache.insert("c", 3);
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[test]
    fn invalidate_removes_entry() {
        let (cache, _clock) = cache(4, 60);
        cache.insert("a", 1);
        cache.invalidate(&"a");
        assert_eq!(cache.get(&"a"), None);
    }

    #[test]
    fn zero_capacity_still_holds_one() {
        let (cache, _clock) = cache(0, 60);
        cache.insert("a", 1);
        assert_eq!(cache.len(), 1);
    }
}
