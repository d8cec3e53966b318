//! Bounded most-recently-used read cache.
//!
//! Lives inside the collection coordinator. Touching an entry moves it to
//! the recent end; inserting past capacity evicts the least-recently-used
//! entry. Mutations update the cache, deletes invalidate it, and
//! clear/reset/close purge it. Disabled entirely when `cache_size` is 0.

use lru::LruCache;
use serde_json::Value;
use std::num::NonZeroUsize;

/// Hit/miss counters for a cache, surfaced through collection stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub capacity: usize,
    pub len: usize,
    pub hits: u64,
    pub misses: u64,
}

/// LRU document cache keyed by id.
#[derive(Debug)]
pub struct ReadCache {
    map: LruCache<String, Value>,
    hits: u64,
    misses: u64,
}

impl ReadCache {
    /// Creates a cache holding at most `capacity` documents (must be > 0;
    /// a zero `cache_size` disables the cache at the coordinator level).
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            map: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Looks up a document, promoting it to most-recently-used on hit.
    pub fn get(&mut self, id: &str) -> Option<Value> {
        match self.map.get(id) {
            Some(doc) => {
                self.hits += 1;
                Some(doc.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Inserts or refreshes a document, evicting the LRU entry if full.
    pub fn put(&mut self, id: &str, doc: Value) {
        self.map.put(id.to_string(), doc);
    }

    /// Invalidates one entry (after a delete).
    pub fn remove(&mut self, id: &str) {
        self.map.pop(id);
    }

    /// Drops every entry, keeping the counters.
    pub fn purge(&mut self) {
        self.map.clear();
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            capacity: self.map.cap().get(),
            len: self.map.len(),
            hits: self.hits,
            misses: self.misses,
        }
    }
}
