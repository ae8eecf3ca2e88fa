//! Idle-expiring concurrent cache
//!
//! Every cache in the engine (players, single permissions, permission
//! lists, prefixes/suffixes) is one of these. Entries expire once they
//! have not been read for the configured idle time; expired entries are
//! dropped lazily on access or by [`ExpiringCache::purge_expired`].
//!
//! Every invalidation bumps an epoch. A value computed under an older
//! epoch is returned to its caller but never stored, so an invalidation
//! racing a computation cannot leave the stale value behind.

use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::RwLock;

struct Entry<V> {
    value: V,
    last_access: Instant,
}

/// Concurrent map with a fixed idle-expiry policy
pub struct ExpiringCache<K, V> {
    entries: DashMap<K, Entry<V>>,
    idle: Duration,
    /// Held shared by conditional inserts, exclusive by invalidations
    epoch: RwLock<u64>,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Create an empty cache whose entries expire after `idle`
    pub fn new(idle: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            idle,
            epoch: RwLock::new(0),
        }
    }

    /// Get a live entry, refreshing its idle timer
    pub fn get(&self, key: &K) -> Option<V> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            if entry.last_access.elapsed() <= self.idle {
                entry.last_access = Instant::now();
                return Some(entry.value.clone());
            }
        } else {
            return None;
        }

        // Expired
        self.entries
            .remove_if(key, |_, entry| entry.last_access.elapsed() > self.idle);
        None
    }

    /// Insert or replace an entry
    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(
            key,
            Entry {
                value,
                last_access: Instant::now(),
            },
        );
    }

    /// Current invalidation epoch; pass it to [`ExpiringCache::insert_if_current`]
    pub fn epoch(&self) -> u64 {
        *self.epoch.read()
    }

    /// Insert unless the cache was invalidated since `epoch` was read
    ///
    /// Returns `true` if the value was stored.
    pub fn insert_if_current(&self, epoch: u64, key: K, value: V) -> bool {
        let current = self.epoch.read();
        if *current != epoch {
            return false;
        }
        self.insert(key, value);
        true
    }

    fn bump(&self) -> parking_lot::RwLockWriteGuard<'_, u64> {
        let mut epoch = self.epoch.write();
        *epoch = epoch.wrapping_add(1);
        epoch
    }

    /// Get a live entry or compute and store it
    ///
    /// The computation runs without holding any shard lock, so it may
    /// read other caches (or this one for different keys). Failed
    /// computations are not cached.
    pub fn get_or_try_insert_with<E, F>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let epoch = self.epoch();
        let value = compute()?;
        self.insert_if_current(epoch, key, value.clone());
        Ok(value)
    }

    /// Drop one entry
    pub fn invalidate(&self, key: &K) -> bool {
        let _epoch = self.bump();
        self.entries.remove(key).is_some()
    }

    /// Keep only entries whose key satisfies the predicate
    pub fn retain<F>(&self, mut keep: F)
    where
        F: FnMut(&K) -> bool,
    {
        let _epoch = self.bump();
        self.entries.retain(|key, _| keep(key));
    }

    /// Drop every entry
    pub fn clear(&self) {
        let _epoch = self.bump();
        self.entries.clear();
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.last_access.elapsed() <= self.idle);
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_get_or_insert_computes_once() {
        let cache = ExpiringCache::new(Duration::from_secs(60));
        let calls = Cell::new(0);

        for _ in 0..3 {
            let value: Result<u32, ()> = cache.get_or_try_insert_with("k", || {
                calls.set(calls.get() + 1);
                Ok(7)
            });
            assert_eq!(value, Ok(7));
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache: ExpiringCache<&str, u32> = ExpiringCache::new(Duration::from_secs(60));

        let failed: Result<u32, &str> = cache.get_or_try_insert_with("k", || Err("down"));
        assert_eq!(failed, Err("down"));
        assert!(cache.is_empty());

        let ok: Result<u32, &str> = cache.get_or_try_insert_with("k", || Ok(1));
        assert_eq!(ok, Ok(1));
    }

    #[test]
    fn test_idle_expiry() {
        let cache = ExpiringCache::new(Duration::ZERO);
        cache.insert(1, "one");
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(cache.get(&1), None);
        assert!(cache.is_empty());

        cache.insert(2, "two");
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.purge_expired(), 1);
    }

    #[test]
    fn test_invalidate_and_retain() {
        let cache = ExpiringCache::new(Duration::from_secs(60));
        cache.insert(("alice", 1), true);
        cache.insert(("alice", 2), false);
        cache.insert(("bob", 1), true);

        assert!(cache.invalidate(&("bob", 1)));
        assert!(!cache.invalidate(&("bob", 1)));

        cache.retain(|(name, _)| *name != "alice");
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidation_during_compute_is_not_lost() {
        let cache = ExpiringCache::new(Duration::from_secs(60));

        let stale: Result<&str, ()> = cache.get_or_try_insert_with("k", || {
            cache.clear();
            Ok("old")
        });
        assert_eq!(stale, Ok("old"));
        assert!(cache.is_empty());

        let epoch = cache.epoch();
        cache.retain(|_| true);
        assert!(!cache.insert_if_current(epoch, "k", "old"));
        assert!(cache.insert_if_current(cache.epoch(), "k", "new"));
        assert_eq!(cache.get(&"k"), Some("new"));
    }
}
