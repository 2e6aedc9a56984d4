//! Image-level frame cache
//!
//! Holds standalone per-frame entries: frames demoted out of a decached
//! volume, and frames the surrounding system decoded through another access
//! scheme. The loader consults it before fetching (reuse) and fills it
//! during decache (demotion). Entries record the scaling already applied so
//! a reuse never scales twice.

use crate::error::{Result, VolumeError};
use crate::models::{decode_elements, FrameId, ScalarType, ScalingParameters};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tracing::{debug, warn};

/// Self-contained cache entry for one frame
#[derive(Debug, Clone)]
pub struct CachedFrame {
    pub frame_id: FrameId,
    /// Little-endian pixel payload, owned by the entry
    pub data: Bytes,
    /// Element type of the payload
    pub scalar_type: ScalarType,
    /// Transform already applied to the payload, if any
    pub scaling_applied: Option<ScalingParameters>,
}

impl CachedFrame {
    /// Size of the payload in bytes
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Decode the payload into f32 working values
    pub fn decode(&self) -> Vec<f32> {
        decode_elements(&self.data, self.scalar_type)
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub used_bytes: usize,
    pub capacity_bytes: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Image-level cache contract consumed by the loader
///
/// The eviction policy belongs to the implementation; the loader only relies
/// on "free N bytes or report how much could be freed".
pub trait FrameCache: Send + Sync {
    /// Whether an entry exists for this frame
    fn has(&self, frame_id: &FrameId) -> bool;

    /// Look up an entry, cloning it out of the cache
    fn get(&self, frame_id: &FrameId) -> Option<CachedFrame>;

    /// Insert an entry
    ///
    /// # Returns
    /// * `Err(VolumeError::CacheError)` when the entry cannot be stored;
    ///   callers treat this as a per-frame failure, not a fatal one
    fn put(&self, frame: CachedFrame) -> Result<()>;

    /// Make room for `requested` bytes, evicting own entries as needed
    ///
    /// # Returns
    /// The number of bytes actually available afterwards, capped at
    /// `requested`; may be smaller when the cache cannot free enough.
    fn free_bytes(&self, requested: usize) -> usize;
}

struct CacheEntry {
    frame: CachedFrame,
    last_accessed: u64,
}

/// In-memory [`FrameCache`] with byte accounting and LRU eviction
pub struct InMemoryFrameCache {
    storage: RwLock<HashMap<FrameId, CacheEntry>>,
    capacity_bytes: usize,
    used_bytes: RwLock<usize>,
    access_clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl InMemoryFrameCache {
    /// Create a cache with a byte capacity
    pub fn new(capacity_bytes: usize) -> Self {
        InMemoryFrameCache {
            storage: RwLock::new(HashMap::new()),
            capacity_bytes,
            used_bytes: RwLock::new(0),
            access_clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let storage = self.storage.read().unwrap();
        CacheStats {
            total_entries: storage.len(),
            used_bytes: *self.used_bytes.read().unwrap(),
            capacity_bytes: self.capacity_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn tick(&self) -> u64 {
        self.access_clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Evict least recently used entries until at least `needed_bytes` are
    /// free or the cache is empty
    fn evict_lru(&self, needed_bytes: usize) {
        let mut storage = self.storage.write().unwrap();
        let mut used = self.used_bytes.write().unwrap();

        let mut entries: Vec<(FrameId, u64, usize)> = storage
            .iter()
            .map(|(k, v)| (k.clone(), v.last_accessed, v.frame.byte_len()))
            .collect();
        entries.sort_by_key(|(_, last_accessed, _)| *last_accessed);

        let mut freed = 0usize;
        for (frame_id, _, size) in entries {
            if self.capacity_bytes - *used >= needed_bytes {
                break;
            }
            storage.remove(&frame_id);
            *used = used.saturating_sub(size);
            freed += size;
        }

        if freed > 0 {
            debug!(freed_bytes = freed, "evicted LRU frame entries");
        }
    }
}

impl FrameCache for InMemoryFrameCache {
    fn has(&self, frame_id: &FrameId) -> bool {
        self.storage.read().unwrap().contains_key(frame_id)
    }

    fn get(&self, frame_id: &FrameId) -> Option<CachedFrame> {
        let clock = self.tick();
        let mut storage = self.storage.write().unwrap();
        match storage.get_mut(frame_id) {
            Some(entry) => {
                entry.last_accessed = clock;
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(frame_id = %frame_id, "frame cache hit");
                Some(entry.frame.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn put(&self, frame: CachedFrame) -> Result<()> {
        let size = frame.byte_len();
        if size > self.capacity_bytes {
            return Err(VolumeError::CacheError(format!(
                "entry of {} bytes exceeds cache capacity {}",
                size, self.capacity_bytes
            )));
        }

        {
            let used = *self.used_bytes.read().unwrap();
            if used + size > self.capacity_bytes {
                self.evict_lru(size);
            }
        }

        let clock = self.tick();
        let mut storage = self.storage.write().unwrap();
        let mut used = self.used_bytes.write().unwrap();

        if *used + size > self.capacity_bytes {
            warn!(
                frame_id = %frame.frame_id,
                size,
                "frame cache full, rejecting entry"
            );
            return Err(VolumeError::CacheError(format!(
                "insufficient capacity for {} bytes",
                size
            )));
        }

        if let Some(old) = storage.insert(
            frame.frame_id.clone(),
            CacheEntry {
                frame,
                last_accessed: clock,
            },
        ) {
            *used = used.saturating_sub(old.frame.byte_len());
        }
        *used += size;
        Ok(())
    }

    fn free_bytes(&self, requested: usize) -> usize {
        self.evict_lru(requested.min(self.capacity_bytes));
        let used = *self.used_bytes.read().unwrap();
        let available = self.capacity_bytes - used;
        debug!(requested, available, "frame cache budget request");
        available.min(requested)
    }
}
