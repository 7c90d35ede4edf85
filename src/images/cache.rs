//! Byte-budgeted LRU cache for decoded images.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lru::LruCache;

use crate::models::{CacheKey, Image};

/// Computes how many bytes an entry counts against the capacity
pub type CostFn = fn(&Image) -> usize;

/// Cache entry for an image
#[derive(Clone)]
struct CachedImage {
    /// The decoded image
    image: Arc<Image>,
    /// Bytes charged for this entry when it was inserted
    cost: usize,
}

struct Entries {
    map: LruCache<CacheKey, CachedImage>,
    size: usize,
}

/// Thread-safe image cache bounded by total byte cost.
///
/// The bound is best effort: a single entry costing more than the whole
/// capacity is still stored, after everything else has been evicted.
pub struct SizedImageCache {
    capacity: usize,
    cost: CostFn,
    entries: Mutex<Entries>,
}

impl SizedImageCache {
    /// Create a cache holding up to `capacity` bytes, costed by [`Image::byte_cost`].
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_cost_fn(capacity, Image::byte_cost)
    }

    /// Create a cache with a custom cost function.
    #[must_use]
    pub fn with_cost_fn(capacity: usize, cost: CostFn) -> Self {
        Self {
            capacity,
            cost,
            entries: Mutex::new(Entries {
                map: LruCache::unbounded(),
                size: 0,
            }),
        }
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get a decoded image from cache, marking it most recently used.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<Image>> {
        self.entries()
            .map
            .get(key)
            .map(|entry| Arc::clone(&entry.image))
    }

    /// Store a decoded image, evicting least recently used entries while over capacity.
    pub fn put(&self, key: CacheKey, image: Arc<Image>) {
        let cost = (self.cost)(&image);
        let mut entries = self.entries();

        if let Some(previous) = entries.map.put(key, CachedImage { image, cost }) {
            entries.size = entries.size.saturating_sub(previous.cost);
        }
        entries.size = entries.size.saturating_add(cost);

        // The newest entry is most recently used, so it's never the one evicted
        while entries.size > self.capacity && entries.map.len() > 1 {
            let Some((evicted_key, evicted)) = entries.map.pop_lru() else {
                break;
            };
            entries.size = entries.size.saturating_sub(evicted.cost);
            tracing::trace!("Evicted {evicted_key} ({} bytes)", evicted.cost);
        }
    }

    /// Check if an image is cached, without touching recency.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries().map.contains(key)
    }

    /// Remove one entry.
    pub fn remove(&self, key: &CacheKey) -> Option<Arc<Image>> {
        let mut entries = self.entries();
        let removed = entries.map.pop(key)?;
        entries.size = entries.size.saturating_sub(removed.cost);
        Some(removed.image)
    }

    /// Clear the entire cache.
    pub fn clear(&self) {
        let mut entries = self.entries();
        entries.map.clear();
        entries.size = 0;
    }

    /// Get the number of cached images.
    pub fn len(&self) -> usize {
        self.entries().map.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries().map.is_empty()
    }

    /// Total bytes currently charged.
    pub fn size(&self) -> usize {
        self.entries().size
    }

    /// Maximum bytes, fixed at construction.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Hands out a shared cache for a requested capacity.
///
/// Asking for the capacity of the current cache returns that same cache.
/// Asking for a different capacity builds a fresh, empty cache that
/// replaces it for later callers; entries are not migrated.
#[derive(Default)]
pub struct CacheRegistry {
    current: Mutex<Option<Arc<SizedImageCache>>>,
}

impl CacheRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache with exactly `capacity` bytes.
    pub fn cache(&self, capacity: usize) -> Arc<SizedImageCache> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cache) = current.as_ref().filter(|c| c.capacity() == capacity) {
            return Arc::clone(cache);
        }
        tracing::debug!("Creating image cache with capacity {capacity} bytes");
        let cache = Arc::new(SizedImageCache::new(capacity));
        *current = Some(Arc::clone(&cache));
        cache
    }
}
