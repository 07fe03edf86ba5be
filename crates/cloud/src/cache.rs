//! LRU cache of decoded COG tiles.

use std::num::NonZeroUsize;

use lru::LruCache;

/// Key for cached tiles: (IFD index, tile index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub ifd_idx: usize,
    pub tile_idx: usize,
}

/// Decoded tile samples, row-major, `tile_width * tile_height` long.
pub struct TileCache {
    inner: LruCache<TileKey, Vec<f64>>,
}

impl TileCache {
    /// Capacity is a tile count; zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: LruCache::new(cap),
        }
    }

    pub fn get(&mut self, key: &TileKey) -> Option<&[f64]> {
        self.inner.get(key).map(Vec::as_slice)
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        self.inner.contains(key)
    }

    pub fn insert(&mut self, key: TileKey, samples: Vec<f64>) {
        self.inner.put(key, samples);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
