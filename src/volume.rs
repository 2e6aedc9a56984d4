//! Volume data model and shared scalar buffer
//!
//! A volume owns one contiguous scalar buffer per time point plus the load
//! bookkeeping that ingestion mutates. All frame placement goes through the
//! offset arithmetic here; writers touch disjoint per-frame regions while the
//! completion bitmap and counters are guarded by a single mutex.

use crate::error::{Result, VolumeError};
use crate::models::{
    FrameId, LoadCallback, LoadProgress, ScalarType, VolumeKind, VoxelDimensions,
};
use bitvec::prelude::*;
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock, RwLockReadGuard};

/// Typed scalar storage for one time point
///
/// The element type is fixed at allocation and never changes. Writes convert
/// f32 working values into the buffer's own type; integer buffers round to
/// nearest and clamp to the type's range.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarBuffer {
    Uint8(Vec<u8>),
    Int16(Vec<i16>),
    Float32(Vec<f32>),
}

impl ScalarBuffer {
    /// Allocate a zero-filled buffer of `len` elements
    pub fn allocate(scalar_type: ScalarType, len: usize) -> Self {
        match scalar_type {
            ScalarType::Uint8 => ScalarBuffer::Uint8(vec![0; len]),
            ScalarType::Int16 => ScalarBuffer::Int16(vec![0; len]),
            ScalarType::Float32 => ScalarBuffer::Float32(vec![0.0; len]),
        }
    }

    /// Element type of this buffer
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            ScalarBuffer::Uint8(_) => ScalarType::Uint8,
            ScalarBuffer::Int16(_) => ScalarType::Int16,
            ScalarBuffer::Float32(_) => ScalarType::Float32,
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            ScalarBuffer::Uint8(v) => v.len(),
            ScalarBuffer::Int16(v) => v.len(),
            ScalarBuffer::Float32(v) => v.len(),
        }
    }

    /// Whether the buffer holds no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size in bytes
    pub fn byte_len(&self) -> usize {
        self.len() * self.scalar_type().byte_width()
    }

    fn check_region(&self, offset: usize, len: usize) -> Result<()> {
        if offset + len > self.len() {
            return Err(VolumeError::index_out_of_range(offset + len, self.len()));
        }
        Ok(())
    }

    /// Write f32 working values into the region starting at `offset`
    ///
    /// The region must lie inside the buffer; no other bytes are touched.
    pub fn write_region(&mut self, offset: usize, values: &[f32]) -> Result<()> {
        self.check_region(offset, values.len())?;
        match self {
            ScalarBuffer::Uint8(buf) => {
                for (dst, &v) in buf[offset..offset + values.len()].iter_mut().zip(values) {
                    *dst = v.round().clamp(0.0, u8::MAX as f32) as u8;
                }
            }
            ScalarBuffer::Int16(buf) => {
                for (dst, &v) in buf[offset..offset + values.len()].iter_mut().zip(values) {
                    *dst = v.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16;
                }
            }
            ScalarBuffer::Float32(buf) => {
                buf[offset..offset + values.len()].copy_from_slice(values);
            }
        }
        Ok(())
    }

    /// Read a region back as f32 working values
    pub fn read_region(&self, offset: usize, len: usize) -> Result<Vec<f32>> {
        self.check_region(offset, len)?;
        let values = match self {
            ScalarBuffer::Uint8(buf) => buf[offset..offset + len].iter().map(|&v| v as f32).collect(),
            ScalarBuffer::Int16(buf) => buf[offset..offset + len].iter().map(|&v| v as f32).collect(),
            ScalarBuffer::Float32(buf) => buf[offset..offset + len].to_vec(),
        };
        Ok(values)
    }

    /// Copy a region out as a self-contained little-endian byte payload
    ///
    /// Used by decache to build cache entries that outlive the buffer.
    pub fn region_bytes(&self, offset: usize, len: usize) -> Result<Bytes> {
        self.check_region(offset, len)?;
        let bytes: Vec<u8> = match self {
            ScalarBuffer::Uint8(buf) => buf[offset..offset + len].to_vec(),
            ScalarBuffer::Int16(buf) => buf[offset..offset + len]
                .iter()
                .flat_map(|v| v.to_le_bytes())
                .collect(),
            ScalarBuffer::Float32(buf) => buf[offset..offset + len]
                .iter()
                .flat_map(|v| v.to_le_bytes())
                .collect(),
        };
        Ok(Bytes::from(bytes))
    }
}

/// Load bookkeeping owned by a [`Volume`]
///
/// Mutated only with the volume's status mutex held. The completion bitmap
/// grows monotonically; a volume is never unloaded back to not-loaded.
pub struct LoadStatus {
    loading: bool,
    loaded: bool,
    cancelled: bool,
    completed: BitVec,
    frames_loaded: usize,
    frames_processed: usize,
    failed_frames: usize,
    pending_callbacks: Vec<LoadCallback>,
    refresh_step: f64,
    refresh_target: f64,
}

impl LoadStatus {
    fn new(total_frames: usize) -> Self {
        LoadStatus {
            loading: false,
            loaded: false,
            cancelled: false,
            completed: BitVec::repeat(false, total_frames),
            frames_loaded: 0,
            frames_processed: 0,
            failed_frames: 0,
            pending_callbacks: Vec::new(),
            refresh_step: 0.0,
            refresh_target: f64::INFINITY,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Whether the frame at `index` has been processed (success or failure)
    pub fn is_complete(&self, index: usize) -> bool {
        self.completed.get(index).map(|b| *b).unwrap_or(false)
    }

    pub fn frames_loaded(&self) -> usize {
        self.frames_loaded
    }

    pub fn frames_processed(&self) -> usize {
        self.frames_processed
    }

    pub fn failed_frames(&self) -> usize {
        self.failed_frames
    }

    pub fn total_frames(&self) -> usize {
        self.completed.len()
    }

    pub(crate) fn begin_loading(&mut self, refresh_step: f64) {
        self.loading = true;
        self.cancelled = false;
        self.refresh_step = refresh_step;
        self.refresh_target = refresh_step;
    }

    pub(crate) fn set_cancelled(&mut self) {
        self.loading = false;
        self.cancelled = true;
    }

    pub(crate) fn mark_loaded(&mut self) {
        self.loading = false;
        self.loaded = true;
    }

    /// Mark a frame processed
    ///
    /// Returns false when the frame was already complete; counters are only
    /// advanced on the first completion so duplicate or out-of-order
    /// completions cannot double count.
    pub(crate) fn mark_complete(&mut self, index: usize, success: bool) -> bool {
        if index >= self.completed.len() || self.is_complete(index) {
            return false;
        }
        self.completed.set(index, true);
        self.frames_processed += 1;
        if success {
            self.frames_loaded += 1;
        } else {
            self.failed_frames += 1;
        }
        true
    }

    /// Advance the re-render accumulator
    ///
    /// Returns true when cumulative progress has exceeded the current
    /// threshold; the threshold then moves up by one constant step.
    pub(crate) fn advance_refresh(&mut self) -> bool {
        if (self.frames_processed as f64) > self.refresh_target {
            self.refresh_target += self.refresh_step;
            true
        } else {
            false
        }
    }

    pub(crate) fn push_callback(&mut self, callback: LoadCallback) {
        self.pending_callbacks.push(callback);
    }

    /// Snapshot the callback list for a progress event
    ///
    /// The original list is left in place; snapshotting keeps a callback
    /// that triggers a new `load()` from mutating the in-flight iteration.
    pub(crate) fn callbacks_snapshot(&self) -> Vec<LoadCallback> {
        self.pending_callbacks.clone()
    }

    /// Take the callback list for the terminal completion event
    ///
    /// The list is cleared so late duplicate completions cannot re-fire
    /// finished callbacks.
    pub(crate) fn drain_callbacks(&mut self) -> Vec<LoadCallback> {
        std::mem::take(&mut self.pending_callbacks)
    }

    pub(crate) fn clear_callbacks(&mut self) {
        self.pending_callbacks.clear();
    }

    pub(crate) fn progress(&self, success: bool, error: Option<VolumeError>) -> LoadProgress {
        LoadProgress {
            success,
            frames_loaded: self.frames_loaded,
            frames_processed: self.frames_processed,
            total_frames: self.total_frames(),
            error,
        }
    }

    /// Copy the current state into an immutable snapshot
    pub fn snapshot(&self) -> LoadStatusSnapshot {
        LoadStatusSnapshot {
            loading: self.loading,
            loaded: self.loaded,
            cancelled: self.cancelled,
            frames_loaded: self.frames_loaded,
            frames_processed: self.frames_processed,
            failed_frames: self.failed_frames,
            total_frames: self.total_frames(),
        }
    }
}

/// Immutable view of a volume's load state at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadStatusSnapshot {
    pub loading: bool,
    pub loaded: bool,
    pub cancelled: bool,
    pub frames_loaded: usize,
    pub frames_processed: usize,
    pub failed_frames: usize,
    pub total_frames: usize,
}

/// A volumetric dataset assembled progressively from 2-D frames
///
/// Dimensions, element type, and frame order are fixed at construction. One
/// scalar buffer is allocated per time point and sized for that whole time
/// point up front, so ingestion never reallocates.
pub struct Volume {
    id: String,
    dimensions: VoxelDimensions,
    kind: VolumeKind,
    scalar_type: ScalarType,
    source_type: ScalarType,
    frame_ids: Vec<FrameId>,
    buffers: Vec<RwLock<ScalarBuffer>>,
    active_time_point: AtomicUsize,
    status: Mutex<LoadStatus>,
}

impl Volume {
    /// Create a new volume and allocate its scalar buffers
    ///
    /// # Arguments
    /// * `id` - Identity under which the volume is registered
    /// * `dimensions` - Voxel grid of one time point
    /// * `kind` - Static (3-D) or dynamic (4-D)
    /// * `source_type` - Native element type of the source frames
    /// * `scalar_type` - Element type of the shared buffer; must be able to
    ///   represent `source_type`
    /// * `frame_ids` - Frame identifiers in acquisition order, one per frame
    ///   per time point; the order defines the linear frame index
    ///
    /// # Returns
    /// * `Err(VolumeError::UnsupportedElementType)` when the buffer type is
    ///   narrower than the source type
    /// * `Err(VolumeError::ConfigError)` when the frame id count does not
    ///   match the dimensions
    pub fn new(
        id: impl Into<String>,
        dimensions: VoxelDimensions,
        kind: VolumeKind,
        source_type: ScalarType,
        scalar_type: ScalarType,
        frame_ids: Vec<FrameId>,
    ) -> Result<Self> {
        if !scalar_type.can_represent(source_type) {
            return Err(VolumeError::UnsupportedElementType(format!(
                "buffer type {} cannot represent source type {}",
                scalar_type, source_type
            )));
        }

        let time_points = kind.time_point_count();
        if time_points == 0 {
            return Err(VolumeError::ConfigError(
                "dynamic volume must have at least one time point".to_string(),
            ));
        }

        let expected_frames = dimensions.frames_per_time_point * time_points;
        if frame_ids.len() != expected_frames {
            return Err(VolumeError::ConfigError(format!(
                "expected {} frame ids ({} per time point x {} time points), got {}",
                expected_frames,
                dimensions.frames_per_time_point,
                time_points,
                frame_ids.len()
            )));
        }

        let buffers = (0..time_points)
            .map(|_| {
                RwLock::new(ScalarBuffer::allocate(
                    scalar_type,
                    dimensions.elements_per_time_point(),
                ))
            })
            .collect();

        let total_frames = frame_ids.len();
        Ok(Volume {
            id: id.into(),
            dimensions,
            kind,
            scalar_type,
            source_type,
            frame_ids,
            buffers,
            active_time_point: AtomicUsize::new(0),
            status: Mutex::new(LoadStatus::new(total_frames)),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dimensions(&self) -> VoxelDimensions {
        self.dimensions
    }

    pub fn kind(&self) -> VolumeKind {
        self.kind
    }

    /// Element type of the shared buffers
    pub fn scalar_type(&self) -> ScalarType {
        self.scalar_type
    }

    /// Native element type of the source frames
    pub fn source_type(&self) -> ScalarType {
        self.source_type
    }

    pub fn frame_ids(&self) -> &[FrameId] {
        &self.frame_ids
    }

    /// Total frame count across all time points
    pub fn frame_count(&self) -> usize {
        self.frame_ids.len()
    }

    pub fn time_point_count(&self) -> usize {
        self.kind.time_point_count()
    }

    pub fn elements_per_frame(&self) -> usize {
        self.dimensions.elements_per_frame()
    }

    /// Size of one frame region in the shared buffer, in bytes
    pub fn bytes_per_frame(&self) -> usize {
        self.elements_per_frame() * self.scalar_type.byte_width()
    }

    /// Frame id for a linear frame index
    pub fn frame_id(&self, frame_index: usize) -> Result<&FrameId> {
        self.frame_ids
            .get(frame_index)
            .ok_or_else(|| VolumeError::index_out_of_range(frame_index, self.frame_ids.len()))
    }

    /// Map a linear frame index to its time point and position within it
    ///
    /// `frame_within = frame_index mod frames_per_time_point`; the frame id
    /// order is authoritative for this mapping.
    pub fn frame_index_to_time_point(&self, frame_index: usize) -> Result<(usize, usize)> {
        if frame_index >= self.frame_count() {
            return Err(VolumeError::index_out_of_range(frame_index, self.frame_count()));
        }
        let per_tp = self.dimensions.frames_per_time_point;
        Ok((frame_index / per_tp, frame_index % per_tp))
    }

    /// Byte offset of a frame region within its time point buffer
    ///
    /// The offset is expressed in the buffer's own element width.
    pub fn byte_offset_for(&self, frame_within_time_point: usize) -> Result<usize> {
        if frame_within_time_point >= self.dimensions.frames_per_time_point {
            return Err(VolumeError::index_out_of_range(
                frame_within_time_point,
                self.dimensions.frames_per_time_point,
            ));
        }
        Ok(frame_within_time_point * self.bytes_per_frame())
    }

    /// Element offset of a frame region within its time point buffer
    pub fn element_offset_for(&self, frame_within_time_point: usize) -> Result<usize> {
        Ok(self.byte_offset_for(frame_within_time_point)? / self.scalar_type.byte_width())
    }

    /// Write scaled frame values into the shared buffer
    ///
    /// The write touches exactly the frame's own region; concurrent writes
    /// to other frames land on disjoint byte ranges.
    pub fn write_frame(&self, frame_index: usize, values: &[f32]) -> Result<()> {
        if values.len() != self.elements_per_frame() {
            return Err(VolumeError::DimensionMismatch {
                expected: self.elements_per_frame(),
                actual: values.len(),
            });
        }
        let (time_point, frame_within) = self.frame_index_to_time_point(frame_index)?;
        let offset = self.element_offset_for(frame_within)?;
        let mut buffer = self.buffers[time_point].write().unwrap();
        buffer.write_region(offset, values)
    }

    /// Read one frame's values back out of the shared buffer
    pub fn read_frame(&self, frame_index: usize) -> Result<Vec<f32>> {
        let (time_point, frame_within) = self.frame_index_to_time_point(frame_index)?;
        let offset = self.element_offset_for(frame_within)?;
        let buffer = self.buffers[time_point].read().unwrap();
        buffer.read_region(offset, self.elements_per_frame())
    }

    /// Copy one frame's bytes into a self-contained payload
    pub fn frame_bytes(&self, frame_index: usize) -> Result<Bytes> {
        let (time_point, frame_within) = self.frame_index_to_time_point(frame_index)?;
        let offset = self.element_offset_for(frame_within)?;
        let buffer = self.buffers[time_point].read().unwrap();
        buffer.region_bytes(offset, self.elements_per_frame())
    }

    /// Read access to a whole time point buffer
    pub fn scalar_buffer(&self, time_point: usize) -> Result<RwLockReadGuard<'_, ScalarBuffer>> {
        let buffer = self
            .buffers
            .get(time_point)
            .ok_or_else(|| VolumeError::index_out_of_range(time_point, self.buffers.len()))?;
        Ok(buffer.read().unwrap())
    }

    /// Time point currently presented to the user; drives 4-D interleaving
    pub fn active_time_point(&self) -> usize {
        self.active_time_point.load(Ordering::Relaxed)
    }

    pub fn set_active_time_point(&self, time_point: usize) -> Result<()> {
        if time_point >= self.time_point_count() {
            return Err(VolumeError::index_out_of_range(
                time_point,
                self.time_point_count(),
            ));
        }
        self.active_time_point.store(time_point, Ordering::Relaxed);
        Ok(())
    }

    /// Snapshot of the load state
    pub fn load_status(&self) -> LoadStatusSnapshot {
        self.status.lock().unwrap().snapshot()
    }

    pub(crate) fn status(&self) -> &Mutex<LoadStatus> {
        &self.status
    }
}
