use std::{
    fmt::Display,
    hash::Hash,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use followsweeper_common::models::CacheStats;
use tracing::debug;

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.stored_at.elapsed() > ttl
    }
}

/// Keyed store whose entries expire a fixed time after they were written.
///
/// Expired entries are dropped lazily when read, or in bulk by [`sweep`].
///
/// [`sweep`]: TtlCache::sweep
#[derive(Debug)]
pub struct TtlCache<K: Eq + Hash, V> {
    entries: DashMap<K, CacheEntry<V>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Display,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn get(&self, key: &K) -> Option<V> {
        {
            let entry = self.entries.get(key)?;
            if !entry.is_expired(self.ttl) {
                return Some(entry.value.clone());
            }
        }

        if self
            .entries
            .remove_if(key, |_, entry| entry.is_expired(self.ttl))
            .is_some()
        {
            debug!("Evicted expired cache entry {}", key);
        }
        None
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|(_, entry)| entry.value)
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Drops every expired entry and returns how many went.
    pub fn sweep(&self) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired(self.ttl);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let mut entries: Vec<String> = self.entries.iter().map(|e| e.key().to_string()).collect();
        entries.sort();
        CacheStats {
            size: entries.len(),
            entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread::sleep;

    use super::*;

    #[test]
    fn fresh_entries_are_returned() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert(3u64, "dwr".to_string());

        assert_eq!(cache.get(&3), Some("dwr".to_string()));
        assert_eq!(cache.get(&4), None);
    }

    #[test]
    fn expired_entry_is_evicted_on_read() {
        let cache = TtlCache::new(Duration::from_millis(10));
        cache.insert(1u64, vec![1, 2, 3]);
        sleep(Duration::from_millis(30));

        assert_eq!(cache.get(&1), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn sweep_only_drops_expired_entries() {
        let cache = TtlCache::new(Duration::from_millis(40));
        cache.insert("old".to_string(), 1);
        sleep(Duration::from_millis(60));
        cache.insert("new".to_string(), 2);

        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"new".to_string()), Some(2));
    }

    #[test]
    fn stats_list_sorted_keys() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert(20u64, ());
        cache.insert(3u64, ());

        let stats = cache.stats();
        assert_eq!(stats.size, 2);
        assert_eq!(stats.entries, vec!["20", "3"]);

        cache.clear();
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn remove_returns_value() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert(7u64, "x");

        assert_eq!(cache.remove(&7), Some("x"));
        assert_eq!(cache.remove(&7), None);
    }
}
