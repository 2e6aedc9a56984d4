//! Decache coordination
//!
//! Reclaims a volume's memory. Full removal drops the buffers outright;
//! demotion first converts frames, in native order, into standalone entries
//! in the image-level cache until the byte budget runs out. Demotion is
//! lossy by design: frames that do not fit are simply not preserved, and
//! the volume's buffers are released either way.

use crate::cache::{CachedFrame, FrameCache};
use crate::error::VolumeError;
use crate::metadata::MetadataProvider;
use crate::metrics::LoadMetrics;
use crate::registry::VolumeRegistry;
use crate::volume::Volume;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Evicts volumes from the registry, optionally demoting frames
pub struct DecacheCoordinator {
    registry: Arc<VolumeRegistry>,
    cache: Arc<dyn FrameCache>,
    metadata: Arc<dyn MetadataProvider>,
    metrics: Arc<LoadMetrics>,
}

impl DecacheCoordinator {
    /// Create a coordinator
    ///
    /// # Arguments
    /// * `registry` - Volume-level cache the coordinator releases from
    /// * `cache` - Image-level cache receiving demoted frames
    /// * `metadata` - Source of the scaling parameters recorded on demoted
    ///   entries, so a later reuse never scales twice
    pub fn new(
        registry: Arc<VolumeRegistry>,
        cache: Arc<dyn FrameCache>,
        metadata: Arc<dyn MetadataProvider>,
    ) -> Self {
        DecacheCoordinator {
            registry,
            cache,
            metadata,
            metrics: Arc::new(LoadMetrics::new()),
        }
    }

    /// Share a metrics collector with the load side
    pub fn with_metrics(mut self, metrics: Arc<LoadMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Evict a volume
    ///
    /// # Arguments
    /// * `volume_id` - Registry key of the volume
    /// * `completely_remove` - When true the buffers are dropped without
    ///   preserving any frame; when false frames are demoted to the
    ///   image-level cache first, as budget allows
    ///
    /// The volume is released from the registry unconditionally, even when
    /// only some (or none) of its frames could be demoted.
    pub fn decache(&self, volume_id: &str, completely_remove: bool) {
        let Some(volume) = self.registry.get(volume_id) else {
            warn!(volume_id, "decache requested for unknown volume");
            return;
        };

        if !completely_remove {
            self.demote_frames(&volume);
        }

        self.registry.remove(volume_id);
        info!(volume_id, completely_remove, "volume decached");
    }

    /// Copy frames into the image-level cache until the budget is exhausted
    fn demote_frames(&self, volume: &Arc<Volume>) {
        let bytes_per_frame = volume.bytes_per_frame();
        let total_bytes = bytes_per_frame * volume.frame_count();
        let mut budget = self.cache.free_bytes(total_bytes);

        if budget < total_bytes {
            let error = VolumeError::CacheFull {
                requested: total_bytes,
                freed: budget,
            };
            warn!(volume_id = volume.id(), %error, "demoting a subset of frames");
        }

        let mut demoted = 0usize;
        for frame_index in 0..volume.frame_count() {
            if budget < bytes_per_frame {
                debug!(
                    volume_id = volume.id(),
                    frame_index, "frame cache budget exhausted"
                );
                break;
            }

            let frame_id = match volume.frame_id(frame_index) {
                Ok(frame_id) => frame_id.clone(),
                Err(error) => {
                    warn!(volume_id = volume.id(), frame_index, %error, "bad frame index");
                    break;
                }
            };

            // The same content may already be cached under this identity;
            // never insert a duplicate.
            if self.cache.has(&frame_id) {
                continue;
            }

            let data = match volume.frame_bytes(frame_index) {
                Ok(data) => data,
                Err(error) => {
                    warn!(volume_id = volume.id(), frame_index, %error, "failed to slice frame");
                    continue;
                }
            };

            let entry = CachedFrame {
                frame_id: frame_id.clone(),
                data,
                scalar_type: volume.scalar_type(),
                scaling_applied: Some(self.metadata.scaling_for(&frame_id)),
            };

            match self.cache.put(entry) {
                Ok(()) => {
                    budget -= bytes_per_frame;
                    demoted += 1;
                    self.metrics.record_frame_decached();
                }
                Err(error) => {
                    warn!(volume_id = volume.id(), %frame_id, %error, "failed to demote frame");
                }
            }
        }

        debug!(
            volume_id = volume.id(),
            demoted,
            total_frames = volume.frame_count(),
            "frame demotion finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryFrameCache;
    use crate::metadata::UniformScaling;
    use crate::models::{FrameId, ScalarType, ScalingParameters, VolumeKind, VoxelDimensions};

    fn volume_with_values(frames: usize) -> Arc<Volume> {
        let volume = Arc::new(
            Volume::new(
                "vol-dec",
                VoxelDimensions::new(2, 2, frames).unwrap(),
                VolumeKind::Static,
                ScalarType::Int16,
                ScalarType::Float32,
                (0..frames)
                    .map(|i| FrameId::new(format!("frame-{}", i)))
                    .collect(),
            )
            .unwrap(),
        );
        for index in 0..frames {
            volume.write_frame(index, &vec![index as f32; 4]).unwrap();
        }
        volume
    }

    fn coordinator(
        cache: Arc<InMemoryFrameCache>,
        volume: Arc<Volume>,
    ) -> (DecacheCoordinator, Arc<VolumeRegistry>) {
        let registry = Arc::new(VolumeRegistry::new());
        registry.insert(volume);
        let coordinator = DecacheCoordinator::new(
            registry.clone(),
            cache,
            Arc::new(UniformScaling::identity()),
        );
        (coordinator, registry)
    }

    #[test]
    fn test_full_removal_skips_cache() {
        let cache = Arc::new(InMemoryFrameCache::new(1024 * 1024));
        let (coordinator, registry) = coordinator(cache.clone(), volume_with_values(3));

        coordinator.decache("vol-dec", true);

        assert!(!registry.contains("vol-dec"));
        assert_eq!(cache.stats().total_entries, 0);
    }

    #[test]
    fn test_demotion_preserves_frame_content() {
        let cache = Arc::new(InMemoryFrameCache::new(1024 * 1024));
        let (coordinator, registry) = coordinator(cache.clone(), volume_with_values(3));

        coordinator.decache("vol-dec", false);

        assert!(!registry.contains("vol-dec"));
        assert_eq!(cache.stats().total_entries, 3);
        let entry = cache.get(&FrameId::new("frame-2")).unwrap();
        assert_eq!(entry.scalar_type, ScalarType::Float32);
        assert_eq!(entry.decode(), vec![2.0; 4]);
        assert!(entry.scaling_applied.is_some());
    }

    #[test]
    fn test_budget_bounds_demoted_frames() {
        // Budget for exactly two 16-byte frames out of five.
        let volume = volume_with_values(5);
        assert_eq!(volume.bytes_per_frame(), 16);
        let cache = Arc::new(InMemoryFrameCache::new(32));
        let (coordinator, registry) = coordinator(cache.clone(), volume);

        coordinator.decache("vol-dec", false);

        assert!(!registry.contains("vol-dec"));
        assert_eq!(cache.stats().total_entries, 2);
        // Native order: the first two frames are preserved.
        assert!(cache.has(&FrameId::new("frame-0")));
        assert!(cache.has(&FrameId::new("frame-1")));
        assert!(!cache.has(&FrameId::new("frame-2")));
    }

    #[test]
    fn test_existing_entries_are_not_duplicated() {
        let volume = volume_with_values(3);
        let cache = Arc::new(InMemoryFrameCache::new(1024));
        let already = CachedFrame {
            frame_id: FrameId::new("frame-1"),
            data: bytes::Bytes::from(vec![9u8; 4]),
            scalar_type: ScalarType::Uint8,
            scaling_applied: Some(ScalingParameters::identity()),
        };
        cache.put(already).unwrap();

        let (coordinator, _) = coordinator(cache.clone(), volume);
        coordinator.decache("vol-dec", false);

        // The pre-existing entry is untouched.
        let entry = cache.get(&FrameId::new("frame-1")).unwrap();
        assert_eq!(entry.byte_len(), 4);
        assert_eq!(cache.stats().total_entries, 3);
    }

    #[test]
    fn test_unknown_volume_is_noop() {
        let cache = Arc::new(InMemoryFrameCache::new(1024));
        let registry = Arc::new(VolumeRegistry::new());
        let coordinator = DecacheCoordinator::new(
            registry,
            cache.clone(),
            Arc::new(UniformScaling::identity()),
        );
        coordinator.decache("missing", false);
        assert_eq!(cache.stats().total_entries, 0);
    }

    #[test]
    fn test_metrics_record_demotions() {
        let cache = Arc::new(InMemoryFrameCache::new(1024));
        let metrics = Arc::new(LoadMetrics::new());
        let registry = Arc::new(VolumeRegistry::new());
        registry.insert(volume_with_values(2));
        let coordinator = DecacheCoordinator::new(
            registry,
            cache,
            Arc::new(UniformScaling::identity()),
        )
        .with_metrics(metrics.clone());

        coordinator.decache("vol-dec", false);
        assert_eq!(metrics.snapshot().frames_decached, 2);
    }
}
