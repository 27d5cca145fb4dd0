//! Bounded LRU cache of decoded segments.
//!
//! Decoding a multi-megabyte segment dominates query cost, and range queries
//! over adjacent windows tend to touch the same files repeatedly. The cache
//! keeps the most recently used [`SegmentLog`]s keyed by path.
//!
//! Cached values are `Arc<SegmentLog>`, which is immutable, so handing the
//! same segment to several callers never lets one of them observe another's
//! replay. A capacity of `0` disables caching entirely.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use ahash::AHashMap;

use crate::error::Result;
use crate::segment::SegmentLog;

/// Hit/miss/eviction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of lookups served from the cache (0.0 when unused).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct CacheInner {
    /// path -> (segment, last-use tick)
    entries: AHashMap<PathBuf, (Arc<SegmentLog>, u64)>,
    tick: u64,
    stats: CacheStats,
}

/// Least-recently-used segment cache.
#[derive(Debug)]
pub struct SegmentCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl SegmentCache {
    /// Create a cache holding at most `capacity` segments.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    /// Create a cache that never retains anything.
    pub fn disabled() -> Self {
        Self::new(0)
    }

    /// Maximum number of retained segments.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns true if the cache retains segments.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    // Entries are never left half-updated, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Return the cached segment for `path`, or load it with `loader` and
    /// cache the result.
    ///
    /// Loader errors are returned unchanged and nothing is cached.
    pub fn get_or_load<F>(&self, path: &Path, loader: F) -> Result<Arc<SegmentLog>>
    where
        F: FnOnce(&Path) -> Result<SegmentLog>,
    {
        if !self.is_enabled() {
            self.lock().stats.misses += 1;
            return loader(path).map(Arc::new);
        }

        {
            let mut inner = self.lock();
            inner.tick += 1;
            let tick = inner.tick;
            if let Some((segment, last_used)) = inner.entries.get_mut(path) {
                *last_used = tick;
                let segment = Arc::clone(segment);
                inner.stats.hits += 1;
                log::debug!("Segment cache hit: {}", path.display());
                return Ok(segment);
            }
            inner.stats.misses += 1;
        }

        // Load outside the lock so slow decodes don't serialize lookups.
        let segment = Arc::new(loader(path)?);

        let mut inner = self.lock();
        inner.tick += 1;
        let tick = inner.tick;
        inner
            .entries
            .insert(path.to_path_buf(), (Arc::clone(&segment), tick));

        while inner.entries.len() > self.capacity {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, (_, last_used))| *last_used)
                .map(|(p, _)| p.clone());
            match oldest {
                Some(victim) => {
                    inner.entries.remove(&victim);
                    inner.stats.evictions += 1;
                    log::debug!("Segment cache evicted: {}", victim.display());
                }
                None => break,
            }
        }

        Ok(segment)
    }

    /// Returns true if `path` is currently cached.
    pub fn contains(&self, path: &Path) -> bool {
        self.lock().entries.contains_key(path)
    }

    /// Number of cached segments.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    /// Drop every cached segment. Counters are kept.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }
}

impl Default for SegmentCache {
    fn default() -> Self {
        Self::disabled()
    }
}
