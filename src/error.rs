//! Error types for the volume loader

use thiserror::Error;

/// Result type alias for loader operations
pub type Result<T> = std::result::Result<T, VolumeError>;

/// Error types that can occur while loading, caching, or decaching a volume
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VolumeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Dimension mismatch: expected {expected} elements per frame, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Unsupported element type: {0}")]
    UnsupportedElementType(String),

    #[error("Index {index} out of range (limit {limit})")]
    IndexOutOfRange { index: usize, limit: usize },

    #[error("Fetch failed for frame {frame_id}: {message}")]
    FetchFailure { frame_id: String, message: String },

    #[error("Image cache could not free {requested} bytes (freed {freed})")]
    CacheFull { requested: usize, freed: usize },

    #[error("Cache error: {0}")]
    CacheError(String),
}

impl VolumeError {
    /// Determine if this error is absorbed at the single-frame level
    ///
    /// Returns true for errors that fail one frame and leave the rest of the
    /// load running:
    /// - Fetch failures from the external fetch collaborator
    /// - Dimension mismatches between a fetched frame and the volume
    /// - Cache errors (a frame that cannot be cached is not a load failure)
    /// - Cache budget exhaustion during decache (partial demotion)
    ///
    /// Returns false for errors that are raised synchronously to the caller:
    /// - Construction-time element type errors
    /// - Out-of-range indices (programming errors)
    /// - Configuration errors
    pub fn is_frame_local(&self) -> bool {
        match self {
            VolumeError::FetchFailure { .. } => true,
            VolumeError::DimensionMismatch { .. } => true,
            VolumeError::CacheError(_) => true,
            VolumeError::CacheFull { .. } => true,

            VolumeError::ConfigError(_) => false,
            VolumeError::UnsupportedElementType(_) => false,
            VolumeError::IndexOutOfRange { .. } => false,
        }
    }

    /// Create a FetchFailure from a frame id and message
    pub fn fetch_failure(frame_id: impl Into<String>, message: impl Into<String>) -> Self {
        VolumeError::FetchFailure {
            frame_id: frame_id.into(),
            message: message.into(),
        }
    }

    /// Create an IndexOutOfRange error
    pub fn index_out_of_range(index: usize, limit: usize) -> Self {
        VolumeError::IndexOutOfRange { index, limit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_failure_is_frame_local() {
        let error = VolumeError::fetch_failure("frame-1", "connection reset");
        assert!(error.is_frame_local());
    }

    #[test]
    fn test_dimension_mismatch_is_frame_local() {
        let error = VolumeError::DimensionMismatch {
            expected: 4096,
            actual: 1024,
        };
        assert!(error.is_frame_local());
    }

    #[test]
    fn test_construction_errors_are_fatal() {
        let error = VolumeError::UnsupportedElementType("Uint8 cannot hold Float32".to_string());
        assert!(!error.is_frame_local());

        let error = VolumeError::index_out_of_range(10, 5);
        assert!(!error.is_frame_local());

        let error = VolumeError::ConfigError("zero concurrency".to_string());
        assert!(!error.is_frame_local());
    }

    #[test]
    fn test_error_display() {
        let error = VolumeError::index_out_of_range(7, 5);
        assert_eq!(error.to_string(), "Index 7 out of range (limit 5)");
    }
}
