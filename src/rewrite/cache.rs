//! RewriteCache: bounded text -> rewritten text memo
//!
//! Values default to the rewritten string; the coordinator stores a
//! [`Rewrite`](crate::rewrite::segment::Rewrite) so the written spans come back
//! with it. Unchanged strings are stored as themselves so that "no match" is
//! cached too. When full, the oldest `evict_fraction` of entries is dropped in one
//! go rather than one at a time.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

/// Cache counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub len: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Debug, Clone)]
pub struct RewriteCache<V = String> {
    entries: HashMap<String, V>,
    order: VecDeque<String>,
    capacity: usize,
    evict_fraction: f64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<V: Clone> RewriteCache<V> {
    /// A zero capacity disables caching
    pub fn new(capacity: usize, evict_fraction: f64) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
            evict_fraction: evict_fraction.clamp(0.01, 1.0),
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&mut self, text: &str) -> Option<&V> {
        match self.entries.get(text) {
            Some(rewritten) => {
                self.hits += 1;
                Some(rewritten)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, text: &str, rewritten: impl Into<V>) {
        if self.capacity == 0 || self.entries.contains_key(text) {
            return;
        }
        if self.entries.len() >= self.capacity {
            self.evict();
        }
        self.entries.insert(text.to_string(), rewritten.into());
        self.order.push_back(text.to_string());
    }

    /// Cached value, or compute, store and return it
    pub fn get_or_insert_with<F>(&mut self, text: &str, compute: F) -> V
    where
        F: FnOnce(&str) -> V,
    {
        if let Some(hit) = self.get(text) {
            return hit.clone();
        }
        let rewritten = compute(text);
        self.insert(text, rewritten.clone());
        rewritten
    }

    fn evict(&mut self) {
        let count = ((self.capacity as f64 * self.evict_fraction).ceil() as usize).max(1);
        for _ in 0..count {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                    self.evictions += 1;
                }
                None => break,
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            len: self.entries.len(),
            capacity: self.capacity,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_miss_then_hit() {
        let mut cache: RewriteCache = RewriteCache::new(4, 0.5);
        assert!(cache.get("a").is_none());
        cache.insert("a", "A");
        assert_eq!(cache.get("a").map(String::as_str), Some("A"));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_identity_entries_record_no_match() {
        let mut cache: RewriteCache = RewriteCache::new(4, 0.5);
        let mut calls = 0;
        for _ in 0..3 {
            let out = cache.get_or_insert_with("plain text", |t| {
                calls += 1;
                t.to_string()
            });
            assert_eq!(out, "plain text");
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_bulk_eviction_drops_oldest() {
        let mut cache: RewriteCache = RewriteCache::new(4, 0.5);
        for key in ["a", "b", "c", "d"] {
            cache.insert(key, key);
        }
        cache.insert("e", "e");

        // Half of capacity (2) evicted at once, then "e" added
        assert_eq!(cache.len(), 3);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_none());
        assert_eq!(cache.get("c").map(String::as_str), Some("c"));
        assert_eq!(cache.get("e").map(String::as_str), Some("e"));
        assert_eq!(cache.stats().evictions, 2);
    }

    #[test]
    fn test_zero_capacity_disables_cache() {
        let mut cache: RewriteCache = RewriteCache::new(0, 0.5);
        cache.insert("a", "A");
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear_keeps_counters() {
        let mut cache: RewriteCache = RewriteCache::new(2, 1.0);
        cache.insert("a", "A");
        cache.get("a");
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().hits, 1);
    }
}
