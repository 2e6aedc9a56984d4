//! Scaling arithmetic
//!
//! Applies the linear rescale (and SUV) transform to decoded frame values,
//! and reconciles values that were already scaled with different parameters
//! without going back to the raw data.

use crate::models::ScalingParameters;
use tracing::warn;

/// Apply a scaling transform in place
///
/// Each value becomes `(value * rescale_slope + rescale_intercept)`,
/// multiplied by the SUV factor when present. Identity transforms are a
/// no-op.
pub fn apply(values: &mut [f32], params: &ScalingParameters) {
    if params.is_identity() {
        return;
    }
    let slope = params.effective_slope();
    let intercept = params.effective_intercept();
    for value in values.iter_mut() {
        *value = (*value as f64 * slope + intercept) as f32;
    }
}

/// Compute the correction that maps values scaled with `used` onto values
/// scaled with `wanted`
///
/// Derived algebraically rather than from raw data:
/// `newSlope = slopeToUse / slopeUsed` and
/// `newIntercept = interceptToUse - interceptUsed * newSlope`, on the
/// SUV-folded effective slope and intercept.
///
/// # Returns
/// * `None` if the parameters already match (never scale twice)
/// * `Some(correction)` to pass to [`apply`] otherwise
pub fn reconcile(used: &ScalingParameters, wanted: &ScalingParameters) -> Option<ScalingParameters> {
    let used_slope = used.effective_slope();
    let used_intercept = used.effective_intercept();
    let wanted_slope = wanted.effective_slope();
    let wanted_intercept = wanted.effective_intercept();

    if used_slope == wanted_slope && used_intercept == wanted_intercept {
        return None;
    }

    if used_slope == 0.0 {
        // Not invertible; the raw values were collapsed to a constant.
        warn!(
            modality = %wanted.modality,
            "cannot reconcile scaling applied with zero slope"
        );
        return None;
    }

    let slope = wanted_slope / used_slope;
    let intercept = wanted_intercept - used_intercept * slope;

    Some(ScalingParameters {
        rescale_slope: slope,
        rescale_intercept: intercept,
        suv_factor: None,
        modality: wanted.modality.clone(),
    })
}
