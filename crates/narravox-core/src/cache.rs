//! Bounded TTL cache for repeated annotation lookups.
//!
//! Entries carry explicit insertion timestamps; staleness is checked on
//! read, and a full entry sweep only happens when an insert would exceed
//! capacity.

use dashmap::DashMap;
use std::time::{Duration, Instant};

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

pub struct TtlCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    ttl: Duration,
    capacity: usize,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Fetch a live entry; a stale one is evicted on the spot.
    pub fn get(&self, key: &str) -> Option<V> {
        {
            let entry = self.entries.get(key)?;
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.value.clone());
            }
            // ref guard dropped here before the remove below
        }
        self.entries.remove(key);
        None
    }

    pub fn insert(&self, key: String, value: V) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            self.evict();
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop every stale entry; if nothing is stale, drop the oldest.
    fn evict(&self) {
        let mut stale: Vec<String> = Vec::new();
        let mut oldest: Option<(String, Instant)> = None;
        for entry in self.entries.iter() {
            if entry.inserted_at.elapsed() >= self.ttl {
                stale.push(entry.key().clone());
            } else if oldest
                .as_ref()
                .map(|(_, at)| entry.inserted_at < *at)
                .unwrap_or(true)
            {
                oldest = Some((entry.key().clone(), entry.inserted_at));
            }
        }
        if !stale.is_empty() {
            for key in stale {
                self.entries.remove(&key);
            }
            return;
        }
        if let Some((key, _)) = oldest {
            self.entries.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_entries_are_returned() {
        let cache = TtlCache::new(Duration::from_secs(60), 8);
        cache.insert("k".into(), 7usize);
        assert_eq!(cache.get("k"), Some(7));
    }

    #[test]
    fn stale_entries_are_evicted_on_read() {
        let cache = TtlCache::new(Duration::ZERO, 8);
        cache.insert("k".into(), 7usize);
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_is_bounded() {
        let cache = TtlCache::new(Duration::from_secs(60), 3);
        for i in 0..10 {
            cache.insert(format!("k{i}"), i);
        }
        assert!(cache.len() <= 3);
    }
}
