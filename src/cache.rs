//! Bounded concurrent result cache for lookup responses.
//!
//! Keys are (backend tag, needle bytes); values cache both hits and misses,
//! so a cached `None` means "known absent". Eviction is approximate LRU via
//! two generations: inserts land in the active map, and when it reaches half
//! the capacity the inactive generation is dropped wholesale and the active
//! one takes its place. Reads promote inactive entries back into active.
//! This keeps eviction O(1) amortized without a global LRU list under
//! contention.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

pub type CacheKey = (&'static str, Vec<u8>);

struct Generations {
    active: HashMap<CacheKey, Option<u32>>,
    inactive: HashMap<CacheKey, Option<u32>>,
}

pub struct QueryCache {
    capacity: usize,
    inner: RwLock<Generations>,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(2),
            inner: RwLock::new(Generations {
                active: HashMap::new(),
                inactive: HashMap::new(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cached response for `key`. The outer `Option` is hit/miss of the
    /// cache itself; the inner one is the cached lookup result.
    pub fn get(&self, key: &CacheKey) -> Option<Option<u32>> {
        {
            let inner = self.inner.read().unwrap();
            if let Some(v) = inner.active.get(key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(*v);
            }
            if !inner.inactive.contains_key(key) {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        }
        // Found in the inactive generation: promote under the write lock.
        let mut inner = self.inner.write().unwrap();
        if let Some(v) = inner.inactive.remove(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            inner.active.insert(key.clone(), v);
            Some(v)
        } else {
            // Raced with a rotation that dropped the entry.
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    pub fn insert(&self, key: CacheKey, value: Option<u32>) {
        let mut inner = self.inner.write().unwrap();
        if inner.active.len() >= self.capacity / 2 {
            inner.inactive = std::mem::take(&mut inner.active);
        }
        inner.active.insert(key, value);
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap();
        inner.active.len() + inner.inactive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(backend: &'static str, q: &[u8]) -> CacheKey {
        (backend, q.to_vec())
    }

    #[test]
    fn test_insert_and_get() {
        let cache = QueryCache::new(16);
        cache.insert(key("sha1", b"aa"), Some(3));
        cache.insert(key("sha1", b"bb"), None);

        assert_eq!(cache.get(&key("sha1", b"aa")), Some(Some(3)));
        // cached miss is distinct from cache miss
        assert_eq!(cache.get(&key("sha1", b"bb")), Some(None));
        assert_eq!(cache.get(&key("sha1", b"cc")), None);
    }

    #[test]
    fn test_backend_tag_separates_keys() {
        let cache = QueryCache::new(16);
        cache.insert(key("sha1", b"aa"), Some(1));
        assert_eq!(cache.get(&key("ntlm", b"aa")), None);
    }

    #[test]
    fn test_rotation_bounds_size() {
        let cache = QueryCache::new(10);
        for i in 0..100u32 {
            cache.insert(key("sha1", &i.to_le_bytes()), Some(i));
        }
        assert!(cache.len() <= 10);
    }

    #[test]
    fn test_recent_entries_survive_rotation() {
        // capacity 8 rotates generations once the active map holds 4
        let cache = QueryCache::new(8);
        cache.insert(key("sha1", b"hot"), Some(1));
        // keep touching the hot entry; promotion must carry it across
        // generation rotations triggered by the other inserts
        for i in 0..10u32 {
            cache.insert(key("sha1", &i.to_le_bytes()), Some(i));
            assert_eq!(cache.get(&key("sha1", b"hot")), Some(Some(1)));
        }
    }

    #[test]
    fn test_stats() {
        let cache = QueryCache::new(16);
        cache.insert(key("sha1", b"aa"), Some(1));
        let _ = cache.get(&key("sha1", b"aa"));
        let _ = cache.get(&key("sha1", b"zz"));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }
}
