//! Frame request planning
//!
//! Turns a volume's frame list into the ordered set of fetch requests for
//! one load attempt. Frames already processed generate no request. For
//! static volumes the order is reversed before submission so the frames
//! most recently appended to the queue run with the shortest latency; for
//! dynamic volumes the time points are interleaved nearest-first around the
//! active time point so the temporally closest data arrives first.

use crate::error::Result;
use crate::metadata::MetadataProvider;
use crate::models::{FrameRequest, VolumeKind};
use crate::volume::{LoadStatus, Volume};
use tracing::debug;

/// Planner producing the fetch requests for one load attempt
pub struct FrameRequestPlanner;

impl FrameRequestPlanner {
    /// Build the request list for a volume
    ///
    /// # Arguments
    /// * `volume` - The volume being loaded
    /// * `status` - Load state; completed frames are skipped
    /// * `metadata` - Queried once per emitted request for scaling
    /// * `priority` - Priority stamped on every request
    ///
    /// # Returns
    /// Requests in submission order. The list is empty when every frame is
    /// already complete.
    pub fn plan(
        volume: &Volume,
        status: &LoadStatus,
        metadata: &dyn MetadataProvider,
        priority: i32,
    ) -> Result<Vec<FrameRequest>> {
        let requests = match volume.kind() {
            VolumeKind::Static => {
                let mut requests =
                    Self::requests_for_time_point(volume, status, metadata, priority, 0)?;
                // Nearest frames are appended last so the scheduler pops
                // them with the shortest queue latency.
                requests.reverse();
                requests
            }
            VolumeKind::Dynamic { time_points } => {
                let mut requests = Vec::new();
                for time_point in
                    interleaved_time_points(volume.active_time_point(), time_points)
                {
                    requests.extend(Self::requests_for_time_point(
                        volume, status, metadata, priority, time_point,
                    )?);
                }
                requests
            }
        };

        debug!(
            volume_id = volume.id(),
            requests = requests.len(),
            skipped = volume.frame_count() - requests.len(),
            "planned frame requests"
        );
        Ok(requests)
    }

    /// Requests for one time point, in native acquisition order
    fn requests_for_time_point(
        volume: &Volume,
        status: &LoadStatus,
        metadata: &dyn MetadataProvider,
        priority: i32,
        time_point: usize,
    ) -> Result<Vec<FrameRequest>> {
        let per_time_point = volume.dimensions().frames_per_time_point;
        let mut requests = Vec::new();

        for frame_within in 0..per_time_point {
            let frame_index = time_point * per_time_point + frame_within;
            if status.is_complete(frame_index) {
                continue;
            }
            let frame_id = volume.frame_id(frame_index)?.clone();
            let scaling = metadata.scaling_for(&frame_id);
            requests.push(FrameRequest {
                frame_index,
                frame_id,
                time_point,
                byte_offset: volume.byte_offset_for(frame_within)?,
                length: volume.elements_per_frame(),
                scaling,
                priority,
            });
        }
        Ok(requests)
    }
}

/// Time point visit order for a dynamic volume
///
/// Starts at the active time point and expands outward, previous before
/// next, until every time point is included: active `2` of `[0..5)` yields
/// `[2, 1, 3, 0, 4]`.
pub fn interleaved_time_points(active: usize, count: usize) -> Vec<usize> {
    let mut order = Vec::with_capacity(count);
    if count == 0 {
        return order;
    }
    let active = active.min(count - 1);
    order.push(active);

    let mut offset = 1;
    while order.len() < count {
        if active >= offset {
            order.push(active - offset);
        }
        if active + offset < count {
            order.push(active + offset);
        }
        offset += 1;
    }
    order
}
