//! LRU page cache for rendered pages

use std::num::NonZeroUsize;
use std::sync::Arc;

use log::debug;
use lru::LruCache;

use super::text_layer::TextOverlay;
use super::types::{PixelSurface, Rotation, Size};

/// Default number of rendered pages kept around
pub const DEFAULT_MAX_CACHED: usize = 6;

/// Cache key for rendered pages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Page number (1-based)
    pub page: usize,
    /// Zoom ratio bit pattern; keys compare zoom exactly, without tolerance
    pub zoom_bits: u32,
    pub rotation: Rotation,
}

impl CacheKey {
    #[must_use]
    pub fn new(page: usize, zoom_ratio: f32, rotation: Rotation) -> Self {
        Self {
            page,
            zoom_bits: zoom_ratio.to_bits(),
            rotation,
        }
    }

    #[must_use]
    pub fn zoom_ratio(&self) -> f32 {
        f32::from_bits(self.zoom_bits)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "page {} @ {} / {}",
            self.page,
            self.zoom_ratio(),
            self.rotation
        )
    }
}

/// A fully rendered page: pixels plus the optional text overlay.
///
/// Entries are never mutated after construction. A missing overlay means text
/// extraction failed for this render; that is still a valid entry.
#[derive(Debug, PartialEq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub surface: Arc<PixelSurface>,
    pub overlay: Option<Arc<TextOverlay>>,
    /// Unrotated page size in points
    pub natural_size: Size,
    /// On-screen size of the rotated page at the key's zoom
    pub css_size: Size,
}

/// LRU cache for rendered page data
pub struct PageCache {
    cache: LruCache<CacheKey, Arc<CacheEntry>>,
}

impl PageCache {
    /// Create a new cache with the given capacity
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    /// Get a cached page, promoting it to most recently used
    #[must_use]
    pub fn lookup(&mut self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        self.cache.get(key).cloned()
    }

    /// Check if a key is in the cache without promoting it
    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.cache.contains(key)
    }

    /// Get a cached page without touching its recency
    #[must_use]
    pub fn peek(&self, key: &CacheKey) -> Option<&Arc<CacheEntry>> {
        self.cache.peek(key)
    }

    /// Insert an entry as most recently used, replacing any entry with the
    /// same key and evicting the least recently used one when full.
    pub fn insert(&mut self, entry: CacheEntry) -> Arc<CacheEntry> {
        let key = entry.key;
        let arc = Arc::new(entry);

        if let Some((old_key, _)) = self.cache.push(key, arc.clone()) {
            if old_key == key {
                debug!("Replaced cached {key}");
            } else {
                debug!("Evicted {old_key} to make room for {key}");
            }
        }

        assert!(
            self.cache.len() <= self.capacity(),
            "page cache holds {} entries, bound is {}",
            self.cache.len(),
            self.capacity()
        );
        arc
    }

    /// Release all cached pages
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Keys from least to most recently used
    #[must_use]
    pub fn keys_lru_first(&self) -> Vec<CacheKey> {
        self.cache.iter().rev().map(|(k, _)| *k).collect()
    }

    /// Number of cached pages
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Cache capacity
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }
}

impl Default for PageCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CACHED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(page: usize) -> CacheKey {
        CacheKey::new(page, 1.0, Rotation::Deg0)
    }

    fn entry(key: CacheKey, shade: u8) -> CacheEntry {
        CacheEntry {
            key,
            surface: Arc::new(PixelSurface::filled(2, 2, [shade; 3])),
            overlay: None,
            natural_size: Size::new(100.0, 200.0),
            css_size: Size::new(100.0, 200.0),
        }
    }

    #[test]
    fn cache_insert_and_lookup() {
        let mut cache = PageCache::new(10);
        let k = key(1);
        let inserted = cache.insert(entry(k, 9));

        let found = cache.lookup(&k).expect("hit");
        assert!(Arc::ptr_eq(&found, &inserted));
        assert_eq!(*found, entry(k, 9));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn repeated_lookup_returns_same_entry() {
        let mut cache = PageCache::new(3);
        let k = key(4);
        let inserted = cache.insert(entry(k, 1));

        for _ in 0..5 {
            let found = cache.lookup(&k).expect("hit");
            assert!(Arc::ptr_eq(&found, &inserted));
        }
    }

    #[test]
    fn bound_is_never_exceeded() {
        let mut cache = PageCache::new(DEFAULT_MAX_CACHED);
        for page in 1..=50 {
            cache.insert(entry(key(page), 0));
            assert!(cache.len() <= DEFAULT_MAX_CACHED);
        }
        assert_eq!(cache.len(), DEFAULT_MAX_CACHED);
    }

    #[test]
    fn overflow_evicts_least_recently_used() {
        let mut cache = PageCache::new(3);
        for page in 1..=3 {
            cache.insert(entry(key(page), 0));
        }

        // Promote page 1 so page 2 becomes the oldest
        assert!(cache.lookup(&key(1)).is_some());
        cache.insert(entry(key(4), 0));

        assert!(!cache.contains(&key(2)));
        assert_eq!(cache.keys_lru_first(), vec![key(3), key(1), key(4)]);
    }

    #[test]
    fn reinsert_replaces_and_promotes() {
        let mut cache = PageCache::new(3);
        for page in 1..=3 {
            cache.insert(entry(key(page), 0));
        }

        cache.insert(entry(key(1), 42));
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.keys_lru_first(), vec![key(2), key(3), key(1)]);
        let found = cache.lookup(&key(1)).expect("hit");
        assert_eq!(found.surface.pixels[0], 42);
    }

    #[test]
    fn zoom_is_compared_exactly() {
        let mut cache = PageCache::new(3);
        cache.insert(entry(CacheKey::new(1, 1.1, Rotation::Deg0), 0));

        assert!(cache.contains(&CacheKey::new(1, 1.1, Rotation::Deg0)));
        assert!(!cache.contains(&CacheKey::new(1, 1.1 + f32::EPSILON, Rotation::Deg0)));
        assert!(!cache.contains(&CacheKey::new(1, 1.1, Rotation::Deg90)));
    }

    #[test]
    fn clear_releases_surfaces() {
        let mut cache = PageCache::new(4);
        let inserted = cache.insert(entry(key(1), 0));
        let surface = Arc::downgrade(&inserted.surface);
        drop(inserted);

        cache.clear();
        assert!(cache.is_empty());
        assert!(surface.upgrade().is_none());
    }

    #[test]
    fn zero_capacity_falls_back_to_one() {
        let mut cache = PageCache::new(0);
        cache.insert(entry(key(1), 0));
        cache.insert(entry(key(2), 0));
        assert_eq!(cache.capacity(), 1);
        assert!(cache.contains(&key(2)));
    }
}
