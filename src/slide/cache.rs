use std::num::NonZeroUsize;
use std::sync::Arc;

use image::RgbImage;
use lru::LruCache;

use super::SlideReader;
use crate::error::SlideError;

/// Default cache capacity in number of regions.
///
/// The extraction pipeline revisits a region at most a few steps after first
/// reading it (background gate, then acceptance), so a handful is enough.
pub const DEFAULT_REGION_CACHE_CAPACITY: usize = 16;

/// Cache key: top-left corner and side length of a square region.
type RegionKey = (u32, u32, u32);

/// Region-level caching layer that wraps a worker's `SlideReader`.
///
/// Decoding a region is by far the most expensive step of extraction. The
/// pipeline reads each primary tile once for the background gate and again
/// when it is accepted as its own radius neighbour; the cache collapses those
/// into a single decode.
///
/// The cache is owned by a single worker and is not shared.
pub struct RegionCache {
    /// The underlying reader
    inner: Box<dyn SlideReader>,
    /// Decoded regions
    cache: LruCache<RegionKey, Arc<RgbImage>>,
    hits: u64,
    misses: u64,
}

impl RegionCache {
    /// Create a new RegionCache holding at most `capacity` regions.
    ///
    /// A capacity of zero is treated as one.
    pub fn with_capacity(inner: Box<dyn SlideReader>, capacity: usize) -> Self {
        Self {
            inner,
            cache: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
            hits: 0,
            misses: 0,
        }
    }

    /// Read a region from cache or from the underlying reader.
    pub fn read(&mut self, x: u32, y: u32, size: u32) -> Result<Arc<RgbImage>, SlideError> {
        let key = (x, y, size);
        if let Some(region) = self.cache.get(&key) {
            self.hits += 1;
            return Ok(Arc::clone(region));
        }

        self.misses += 1;
        let region = Arc::new(self.inner.read_region(x, y, size)?);
        self.cache.put(key, Arc::clone(&region));
        Ok(region)
    }

    /// Get dimensions of the underlying slide.
    pub fn dimensions(&self) -> (u32, u32) {
        self.inner.dimensions()
    }

    /// Get the identifier of the underlying slide.
    pub fn identifier(&self) -> &str {
        self.inner.identifier()
    }

    /// Render a thumbnail straight from the underlying reader, bypassing the cache.
    pub fn thumbnail(&self, max_side: u32) -> Result<RgbImage, SlideError> {
        self.inner.thumbnail(max_side)
    }

    /// Get `(hits, misses)` counters.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}
