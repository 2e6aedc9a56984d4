//! Core data models for the volume loader

use crate::error::{Result, VolumeError};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Opaque identifier of a single source frame
///
/// The loader never interprets the contents; equality and ordering are the
/// only operations used. The identifier is whatever the surrounding system
/// uses to address one acquisition image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameId(String);

impl FrameId {
    /// Create a new FrameId
    pub fn new(id: impl Into<String>) -> Self {
        FrameId(id.into())
    }

    /// Get the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FrameId {
    fn from(id: &str) -> Self {
        FrameId(id.to_string())
    }
}

/// Element type of a scalar buffer or a decoded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    Uint8,
    Int16,
    Float32,
}

impl ScalarType {
    /// Width of one element in bytes
    pub fn byte_width(&self) -> usize {
        match self {
            ScalarType::Uint8 => 1,
            ScalarType::Int16 => 2,
            ScalarType::Float32 => 4,
        }
    }

    /// Check whether a buffer of this type can hold values of `source`
    ///
    /// The shared buffer is widened at volume construction to the most
    /// general type in play; a narrower buffer cannot represent a wider
    /// source without loss.
    pub fn can_represent(&self, source: ScalarType) -> bool {
        self.rank() >= source.rank()
    }

    fn rank(&self) -> u8 {
        match self {
            ScalarType::Uint8 => 0,
            ScalarType::Int16 => 1,
            ScalarType::Float32 => 2,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::Uint8 => "Uint8",
            ScalarType::Int16 => "Int16",
            ScalarType::Float32 => "Float32",
        };
        f.write_str(name)
    }
}

/// Voxel grid dimensions of one time point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoxelDimensions {
    /// Columns per frame
    pub columns: usize,
    /// Rows per frame
    pub rows: usize,
    /// Frames stacked into one time point
    pub frames_per_time_point: usize,
}

impl VoxelDimensions {
    /// Create new dimensions
    ///
    /// # Returns
    /// * `Ok(VoxelDimensions)` if every axis is non-zero
    /// * `Err(VolumeError::ConfigError)` otherwise
    pub fn new(columns: usize, rows: usize, frames_per_time_point: usize) -> Result<Self> {
        if columns == 0 || rows == 0 || frames_per_time_point == 0 {
            return Err(VolumeError::ConfigError(format!(
                "dimensions must be non-zero, got {}x{}x{}",
                columns, rows, frames_per_time_point
            )));
        }
        Ok(VoxelDimensions {
            columns,
            rows,
            frames_per_time_point,
        })
    }

    /// Number of scalar elements in one frame
    pub fn elements_per_frame(&self) -> usize {
        self.columns * self.rows
    }

    /// Number of scalar elements in one time point
    pub fn elements_per_time_point(&self) -> usize {
        self.elements_per_frame() * self.frames_per_time_point
    }
}

/// Static (3-D) vs dynamic (4-D, multi-time-point) volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeKind {
    /// Single time point
    Static,
    /// Multiple time points acquired over time
    Dynamic { time_points: usize },
}

impl VolumeKind {
    /// Number of time points this kind carries
    pub fn time_point_count(&self) -> usize {
        match self {
            VolumeKind::Static => 1,
            VolumeKind::Dynamic { time_points } => *time_points,
        }
    }
}

/// Linear rescale transform, with an optional SUV factor for quantitative
/// modalities
///
/// Raw pixel values are stored as
/// `(value * rescale_slope + rescale_intercept) * suv_factor`,
/// where the SUV factor defaults to 1 when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingParameters {
    pub rescale_slope: f64,
    pub rescale_intercept: f64,
    /// Standardized uptake value factor, present for quantitative
    /// modalities such as PT
    pub suv_factor: Option<f64>,
    /// Modality tag of the source series (e.g. "CT", "PT")
    pub modality: String,
}

impl ScalingParameters {
    /// Identity transform: values are stored as fetched
    pub fn identity() -> Self {
        ScalingParameters {
            rescale_slope: 1.0,
            rescale_intercept: 0.0,
            suv_factor: None,
            modality: String::new(),
        }
    }

    /// Create a plain rescale transform
    pub fn rescale(slope: f64, intercept: f64, modality: impl Into<String>) -> Self {
        ScalingParameters {
            rescale_slope: slope,
            rescale_intercept: intercept,
            suv_factor: None,
            modality: modality.into(),
        }
    }

    /// Slope with the SUV factor folded in
    pub fn effective_slope(&self) -> f64 {
        self.rescale_slope * self.suv_factor.unwrap_or(1.0)
    }

    /// Intercept with the SUV factor folded in
    pub fn effective_intercept(&self) -> f64 {
        self.rescale_intercept * self.suv_factor.unwrap_or(1.0)
    }

    /// Check whether applying this transform leaves values unchanged
    pub fn is_identity(&self) -> bool {
        self.effective_slope() == 1.0 && self.effective_intercept() == 0.0
    }
}

impl Default for ScalingParameters {
    fn default() -> Self {
        Self::identity()
    }
}

/// A planned unit of fetch-and-ingest work for one frame
///
/// Immutable once constructed; consumed at most once by the scheduler.
#[derive(Debug, Clone)]
pub struct FrameRequest {
    /// Linear frame index across all time points
    pub frame_index: usize,
    /// Identifier handed to the fetch collaborator
    pub frame_id: FrameId,
    /// Time point holding this frame
    pub time_point: usize,
    /// Byte offset of the frame region inside its time point buffer
    pub byte_offset: usize,
    /// Length of the frame region in elements
    pub length: usize,
    /// Transform to apply before copy-in
    pub scaling: ScalingParameters,
    /// Scheduling priority (soft hint, higher runs earlier)
    pub priority: i32,
}

/// Decoded frame returned by the fetch collaborator
#[derive(Debug, Clone)]
pub struct FetchedFrame {
    /// Raw little-endian pixel payload
    pub pixel_data: Bytes,
    /// Native element type of the payload
    pub scalar_type: ScalarType,
}

impl FetchedFrame {
    /// Create a new FetchedFrame
    pub fn new(pixel_data: Bytes, scalar_type: ScalarType) -> Self {
        FetchedFrame {
            pixel_data,
            scalar_type,
        }
    }

    /// Number of whole elements in the payload
    pub fn element_count(&self) -> usize {
        self.pixel_data.len() / self.scalar_type.byte_width()
    }

    /// Decode the payload into f32 working values
    ///
    /// A trailing partial element is dropped; callers validate the element
    /// count against the volume before copy-in.
    pub fn decode(&self) -> Vec<f32> {
        decode_elements(&self.pixel_data, self.scalar_type)
    }
}

/// Decode a little-endian scalar payload into f32 working values
pub(crate) fn decode_elements(data: &[u8], scalar_type: ScalarType) -> Vec<f32> {
    match scalar_type {
        ScalarType::Uint8 => data.iter().map(|&v| v as f32).collect(),
        ScalarType::Int16 => data
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32)
            .collect(),
        ScalarType::Float32 => data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    }
}

/// Progress/completion report passed to load callbacks
///
/// One report is emitted per processed frame; the final report of a load has
/// `frames_processed == total_frames`.
#[derive(Debug, Clone)]
pub struct LoadProgress {
    /// Whether the frame that triggered this report ingested successfully
    pub success: bool,
    /// Frames ingested successfully so far
    pub frames_loaded: usize,
    /// Frames processed (success or failure) so far
    pub frames_processed: usize,
    /// Total frames in the volume
    pub total_frames: usize,
    /// Error attached to a failed frame
    pub error: Option<VolumeError>,
}

impl LoadProgress {
    /// Whether every frame of the volume has been processed
    pub fn is_complete(&self) -> bool {
        self.frames_processed == self.total_frames
    }
}

/// Callback invoked with progress and completion reports
pub type LoadCallback = Arc<dyn Fn(&LoadProgress) + Send + Sync>;

/// Hook invoked with the volume id when partial progress crosses a
/// re-render threshold
pub type RefreshHook = Arc<dyn Fn(&str) + Send + Sync>;
