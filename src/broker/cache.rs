//! Bounded, TTL-expiring lookup cache shared by broker implementations
//! (§4.C "Lookup cache"). Expired entries are evicted lazily on read;
//! writes evict expired entries first, then the oldest insertion if
//! still over capacity.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    insertion_order: u64,
}

pub struct LookupCache<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
    max_size: usize,
    ttl: Duration,
    next_order: Mutex<u64>,
}

impl<K: Eq + Hash + Clone, V: Clone> LookupCache<K, V> {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_size,
            ttl,
            next_order: Mutex::new(0),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().expect("cache poisoned");
        if let Some(entry) = entries.get(key) {
            if entry.inserted_at.elapsed() > self.ttl {
                entries.remove(key);
                return None;
            }
            return Some(entry.value.clone());
        }
        None
    }

    pub fn put(&self, key: K, value: V) {
        let mut entries = self.entries.lock().expect("cache poisoned");

        // Evict anything already expired before considering capacity.
        let ttl = self.ttl;
        entries.retain(|_, e| e.inserted_at.elapsed() <= ttl);

        if entries.len() >= self.max_size {
            if let Some(oldest_key) = entries
                .iter()
                .min_by_key(|(_, e)| e.insertion_order)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest_key);
            }
        }

        let mut next_order = self.next_order.lock().expect("cache poisoned");
        let order = *next_order;
        *next_order += 1;

        entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
                insertion_order: order,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_entries_are_not_returned() {
        let cache: LookupCache<String, String> = LookupCache::new(10, Duration::from_millis(10));
        cache.put("k".to_string(), "v".to_string());
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get(&"k".to_string()), None);
    }

    #[test]
    fn evicts_oldest_when_over_capacity() {
        let cache: LookupCache<i32, i32> = LookupCache::new(2, Duration::from_secs(60));
        cache.put(1, 100);
        cache.put(2, 200);
        cache.put(3, 300);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some(200));
        assert_eq!(cache.get(&3), Some(300));
    }
}
