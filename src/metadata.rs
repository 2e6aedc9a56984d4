//! Metadata provider boundary
//!
//! Supplies, per frame id, the modality and rescale/SUV parameters used to
//! build a request's [`ScalingParameters`]. Queried once per frame at
//! request construction time; the loader never re-reads metadata after
//! planning.

use crate::models::{FrameId, ScalingParameters};

/// Read-only source of per-frame scaling metadata
pub trait MetadataProvider: Send + Sync {
    /// Scaling parameters for one frame
    fn scaling_for(&self, frame_id: &FrameId) -> ScalingParameters;
}

/// Provider that applies the same parameters to every frame
///
/// Covers the common case of a single-series volume where slope, intercept,
/// and SUV factor are constant across the acquisition.
pub struct UniformScaling {
    scaling: ScalingParameters,
}

impl UniformScaling {
    pub fn new(scaling: ScalingParameters) -> Self {
        UniformScaling { scaling }
    }

    /// Identity scaling for datasets stored without a transform
    pub fn identity() -> Self {
        UniformScaling {
            scaling: ScalingParameters::identity(),
        }
    }
}

impl MetadataProvider for UniformScaling {
    fn scaling_for(&self, _frame_id: &FrameId) -> ScalingParameters {
        self.scaling.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_scaling_is_constant() {
        let provider = UniformScaling::new(ScalingParameters::rescale(2.0, -1024.0, "CT"));
        let a = provider.scaling_for(&FrameId::new("frame-0"));
        let b = provider.scaling_for(&FrameId::new("frame-9"));
        assert_eq!(a, b);
        assert_eq!(a.rescale_slope, 2.0);
    }
}
