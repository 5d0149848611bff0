//! Weighted LRU cache of reverse-read windows.
//!
//! Windows are keyed by the store they came from and the inclusive offset
//! they end at. A lookup for an offset that falls inside a cached window is
//! served from that window, trimmed so it ends at the requested offset, which
//! is exactly what a fresh `reverse_read` would return (shorter, never wrong).

use crate::config::Options;
use crate::error::{Error, Result};
use crate::store::AppendStore;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identifies a cached window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    /// Id of the store the window was read from
    pub store_id: String,
    /// Inclusive offset the window ends at
    pub offset: u64,
}

impl CacheKey {
    /// Create a new cache key
    pub fn new(store_id: impl Into<String>, offset: u64) -> Self {
        Self { store_id: store_id.into(), offset }
    }

    /// Whether `from_inclusive` lies inside a window of `len` bytes under this key.
    fn covers(&self, len: usize, from_inclusive: u64) -> bool {
        from_inclusive <= self.offset && from_inclusive + len as u64 > self.offset
    }
}

/// Statistics for cache performance monitoring.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Total number of cache lookups
    pub lookups: u64,
    /// Lookups served from a cached window
    pub hits: u64,
    /// Lookups that fell through to the store
    pub misses: u64,
    /// Windows admitted
    pub insertions: u64,
    /// Windows pushed out by capacity or entry limits
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.hits as f64 / self.lookups as f64
        }
    }

    /// Reset all statistics to zero
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Thread-safe weighted LRU of store windows.
///
/// Bounded both by total bytes and by number of entries. Windows of
/// `min_entry_bytes` or fewer are never admitted.
#[derive(Debug)]
pub struct ReadCache {
    capacity: usize,
    max_entries: usize,
    min_entry_bytes: usize,
    current_size: AtomicU64,
    /// Ordered so windows of one store are adjacent and sorted by end offset
    cache: RwLock<BTreeMap<CacheKey, Bytes>>,
    /// Most recently used at the back
    lru_queue: RwLock<VecDeque<CacheKey>>,
    stats: RwLock<CacheStats>,
}

impl ReadCache {
    /// Create a cache holding up to `capacity` bytes with default entry limits.
    ///
    /// A capacity of 0 disables caching.
    ///
    /// ```
    /// use backscan::cache::ReadCache;
    ///
    /// let cache = ReadCache::new(8 * 1024 * 1024);
    /// assert!(cache.is_empty());
    /// ```
    pub fn new(capacity: usize) -> Self {
        let defaults = Options::default();
        Self {
            capacity,
            max_entries: defaults.read_cache_max_entries,
            min_entry_bytes: defaults.read_cache_min_entry_bytes,
            current_size: AtomicU64::new(0),
            cache: RwLock::new(BTreeMap::new()),
            lru_queue: RwLock::new(VecDeque::new()),
            stats: RwLock::new(CacheStats::default()),
        }
    }

    /// Create a cache with explicit limits.
    pub fn with_limits(capacity: usize, max_entries: usize, min_entry_bytes: usize) -> Result<Self> {
        if min_entry_bytes == 0 {
            return Err(Error::invalid_argument(
                "Parameter \"minBytesForEntryToCache\" has to be greater than zero",
            ));
        }
        let mut cache = Self::new(capacity);
        cache.max_entries = max_entries;
        cache.min_entry_bytes = min_entry_bytes;
        Ok(cache)
    }

    /// Create a cache from the read-cache fields of `options`.
    pub fn from_options(options: &Options) -> Result<Self> {
        Self::with_limits(
            options.read_cache_capacity,
            options.read_cache_max_entries,
            options.read_cache_min_entry_bytes,
        )
    }

    fn enabled(&self) -> bool {
        self.capacity > 0 && self.max_entries > 0
    }

    /// Get the window stored under exactly `key`.
    pub fn get(&self, key: &CacheKey) -> Option<Bytes> {
        self.stats.write().lookups += 1;
        if !self.enabled() {
            self.stats.write().misses += 1;
            return None;
        }

        let hit = self.cache.read().get(key).cloned();
        self.record(hit.as_ref().map(|_| key));
        hit
    }

    /// Serve `reverse_read(from_inclusive)` for `store_id` from any cached
    /// window that contains the offset.
    pub fn lookup(&self, store_id: &str, from_inclusive: u64) -> Option<Bytes> {
        self.stats.write().lookups += 1;
        if !self.enabled() {
            self.stats.write().misses += 1;
            return None;
        }

        let start = CacheKey::new(store_id, from_inclusive);
        let found = {
            let cache = self.cache.read();
            cache
                .range(start..)
                .take_while(|(key, _)| key.store_id == store_id)
                .find(|(key, value)| key.covers(value.len(), from_inclusive))
                .map(|(key, value)| {
                    let first = key.offset + 1 - value.len() as u64;
                    let keep = (from_inclusive - first + 1) as usize;
                    (key.clone(), value.slice(..keep))
                })
        };

        self.record(found.as_ref().map(|(key, _)| key));
        found.map(|(_, window)| window)
    }

    /// Bump stats and LRU order for a lookup outcome.
    fn record(&self, hit: Option<&CacheKey>) {
        match hit {
            Some(key) => {
                self.touch(key);
                self.stats.write().hits += 1;
            }
            None => self.stats.write().misses += 1,
        }
    }

    /// Admit a window, evicting least recently used ones to make room.
    pub fn insert(&self, key: CacheKey, value: Bytes) {
        if !self.enabled() {
            return;
        }

        let value_size = value.len();
        if value_size <= self.min_entry_bytes || value_size > self.capacity {
            return;
        }

        {
            let mut cache = self.cache.write();
            let mut lru_queue = self.lru_queue.write();
            if let Some(old_value) = cache.remove(&key) {
                self.current_size.fetch_sub(old_value.len() as u64, Ordering::Relaxed);
                lru_queue.retain(|k| k != &key);
            }
        }

        while self.current_size.load(Ordering::Relaxed) as usize + value_size > self.capacity
            || self.len() >= self.max_entries
        {
            if !self.evict_one() {
                break;
            }
        }

        let mut cache = self.cache.write();
        let mut lru_queue = self.lru_queue.write();
        cache.insert(key.clone(), value);
        lru_queue.push_back(key);
        self.current_size.fetch_add(value_size as u64, Ordering::Relaxed);

        drop(cache);
        drop(lru_queue);
        self.stats.write().insertions += 1;
    }

    /// Move `key` to the most recently used end.
    fn touch(&self, key: &CacheKey) {
        let mut lru_queue = self.lru_queue.write();
        if let Some(pos) = lru_queue.iter().position(|k| k == key) {
            lru_queue.remove(pos);
        }
        lru_queue.push_back(key.clone());
    }

    /// Evict the least recently used entry. Returns false if nothing was left.
    fn evict_one(&self) -> bool {
        let key = match self.lru_queue.write().pop_front() {
            Some(key) => key,
            None => return false,
        };

        if let Some(value) = self.cache.write().remove(&key) {
            self.current_size.fetch_sub(value.len() as u64, Ordering::Relaxed);
            self.stats.write().evictions += 1;
        }
        true
    }

    /// Get current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }

    /// Reset cache statistics to zero.
    pub fn reset_stats(&self) {
        self.stats.write().reset();
    }

    /// Clear all entries from the cache.
    pub fn clear(&self) {
        let mut cache = self.cache.write();
        let mut lru_queue = self.lru_queue.write();

        cache.clear();
        lru_queue.clear();
        self.current_size.store(0, Ordering::Relaxed);
    }

    /// Get the current size of cached data in bytes.
    pub fn size(&self) -> usize {
        self.current_size.load(Ordering::Relaxed) as usize
    }

    /// Get the cache capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the number of entries in the cache.
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An [`AppendStore`] whose reverse reads go through a [`ReadCache`].
///
/// Appends pass straight through: bytes already written never change, so
/// cached windows stay valid as the store grows.
pub struct CachedStore {
    inner: Arc<dyn AppendStore>,
    cache: Arc<ReadCache>,
}

impl CachedStore {
    /// Wrap `inner`, sharing `cache` with any other wrapped stores.
    pub fn new(inner: Arc<dyn AppendStore>, cache: Arc<ReadCache>) -> Self {
        Self { inner, cache }
    }

    /// The shared window cache.
    pub fn cache(&self) -> &Arc<ReadCache> {
        &self.cache
    }

    /// The wrapped store.
    pub fn inner(&self) -> &Arc<dyn AppendStore> {
        &self.inner
    }
}

impl fmt::Debug for CachedStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedStore")
            .field("id", &self.inner.id())
            .field("cache", &self.cache)
            .finish()
    }
}

impl AppendStore for CachedStore {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn len(&self) -> u64 {
        self.inner.len()
    }

    fn append(&self, data: &[u8]) -> Result<()> {
        self.inner.append(data)
    }

    fn reverse_read(&self, from_inclusive: u64) -> Result<Option<Bytes>> {
        if let Some(window) = self.cache.lookup(self.inner.id(), from_inclusive) {
            return Ok(Some(window));
        }

        let window = self.inner.reverse_read(from_inclusive)?;
        if let Some(window) = &window {
            self.cache
                .insert(CacheKey::new(self.inner.id(), from_inclusive), window.clone());
        }
        Ok(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_cache_basic_operations() {
        let cache = ReadCache::new(1024);

        let key1 = CacheKey::new("a", 10);
        let value1 = Bytes::from(vec![1, 2, 3, 4]);

        assert_eq!(cache.get(&key1), None);

        cache.insert(key1.clone(), value1.clone());
        assert_eq!(cache.get(&key1), Some(value1));

        let stats = cache.stats();
        assert_eq!(stats.lookups, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.insertions, 1);
    }

    #[test]
    fn test_lookup_inside_window() {
        let cache = ReadCache::new(1024);
        // Window covering offsets 6..=9
        cache.insert(CacheKey::new("a", 9), Bytes::from_static(b"6789"));

        assert_eq!(&cache.lookup("a", 9).unwrap()[..], b"6789");
        assert_eq!(&cache.lookup("a", 7).unwrap()[..], b"67");
        assert_eq!(&cache.lookup("a", 6).unwrap()[..], b"6");
        assert!(cache.lookup("a", 5).is_none());
        assert!(cache.lookup("a", 10).is_none());
        assert!(cache.lookup("b", 8).is_none());
    }

    #[test]
    fn test_small_windows_not_cached() {
        let cache = ReadCache::with_limits(1024, 10, 3).unwrap();
        cache.insert(CacheKey::new("a", 2), Bytes::from_static(b"abc"));
        assert!(cache.is_empty());
        cache.insert(CacheKey::new("a", 3), Bytes::from_static(b"abcd"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_zero_min_entry_bytes_rejected() {
        assert!(ReadCache::with_limits(1024, 10, 0).is_err());
    }

    #[test]
    fn test_cache_lru_eviction() {
        // Holds three 4-byte windows
        let cache = ReadCache::new(12);
        let value = Bytes::from(vec![1, 2, 3, 4]);

        cache.insert(CacheKey::new("a", 3), value.clone());
        cache.insert(CacheKey::new("a", 7), value.clone());
        cache.insert(CacheKey::new("a", 11), value.clone());
        assert_eq!(cache.size(), 12);

        // Touch the oldest so the middle one goes first
        assert!(cache.get(&CacheKey::new("a", 3)).is_some());
        cache.insert(CacheKey::new("a", 15), value.clone());

        assert_eq!(cache.len(), 3);
        assert!(cache.get(&CacheKey::new("a", 3)).is_some());
        assert!(cache.get(&CacheKey::new("a", 7)).is_none());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_max_entries_limit() {
        let cache = ReadCache::with_limits(1024, 2, 1).unwrap();
        for offset in [10, 20, 30] {
            cache.insert(CacheKey::new("a", offset), Bytes::from_static(b"xyz"));
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&CacheKey::new("a", 10)).is_none());
    }

    #[test]
    fn test_update_existing_key() {
        let cache = ReadCache::new(1024);
        let key = CacheKey::new("a", 9);

        cache.insert(key.clone(), Bytes::from_static(b"6789"));
        cache.insert(key.clone(), Bytes::from_static(b"56789"));
        assert_eq!(cache.size(), 5);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_disabled_when_capacity_zero() {
        let cache = ReadCache::new(0);
        let key = CacheKey::new("a", 9);
        cache.insert(key.clone(), Bytes::from_static(b"6789"));
        assert_eq!(cache.get(&key), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_clear_and_reset_stats() {
        let cache = ReadCache::new(1024);
        cache.insert(CacheKey::new("a", 9), Bytes::from_static(b"6789"));
        cache.lookup("a", 8);
        assert!(cache.stats().hit_rate() > 0.99);

        cache.clear();
        cache.reset_stats();
        assert!(cache.is_empty());
        assert_eq!(cache.size(), 0);
        assert_eq!(cache.stats().lookups, 0);
    }

    #[test]
    fn test_cached_store_avoids_store_reads() {
        let memory = Arc::new(MemoryStore::from_bytes("mem", b"0123456789".to_vec(), 10));
        let store = CachedStore::new(memory.clone(), Arc::new(ReadCache::new(1024)));

        assert_eq!(&store.reverse_read(9).unwrap().unwrap()[..], b"0123456789");
        assert_eq!(&store.reverse_read(4).unwrap().unwrap()[..], b"01234");
        assert_eq!(&store.measured_reverse_read(8, 2).unwrap()[..], b"234567");
        assert_eq!(memory.read_ops(), 1);
        assert!(store.reverse_read(10).unwrap().is_none());
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        let cache = Arc::new(ReadCache::new(1024));
        let mut handles = vec![];

        for i in 0..10u64 {
            let cache_clone = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                let key = CacheKey::new("shared", i * 100);
                let value = Bytes::from(vec![i as u8; 10]);
                cache_clone.insert(key.clone(), value.clone());
                assert_eq!(cache_clone.get(&key), Some(value));
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 10);
    }
}
