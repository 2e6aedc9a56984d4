//! Per-frame ingestion pipeline
//!
//! The unit of work the scheduler executes for each frame request: reuse or
//! fetch, reconcile scaling, copy into the shared buffer, account the
//! completion, and fan events out. Only the fetch awaits; everything after
//! the data arrives is synchronous.
//!
//! The pipeline holds its volume weakly. A volume that was decached while
//! requests were still queued is simply gone when the work runs, and the
//! work drains without touching anything.

use crate::cache::FrameCache;
use crate::error::{Result, VolumeError};
use crate::fetcher::FrameFetcher;
use crate::metrics::LoadMetrics;
use crate::models::{FrameRequest, RefreshHook};
use crate::scaling;
use crate::volume::Volume;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Executes one frame request end to end
pub struct IngestionPipeline {
    volume: Weak<Volume>,
    fetcher: Arc<dyn FrameFetcher>,
    cache: Arc<dyn FrameCache>,
    metrics: Arc<LoadMetrics>,
    refresh_hook: Option<RefreshHook>,
    enable_frame_reuse: bool,
}

impl IngestionPipeline {
    /// Create a pipeline bound to a volume
    ///
    /// # Arguments
    /// * `volume` - Weak handle; the pipeline never extends the volume's
    ///   lifetime
    /// * `fetcher` - External fetch-and-decode service
    /// * `cache` - Image-level cache consulted before fetching
    /// * `metrics` - Shared counters
    /// * `refresh_hook` - Invoked when partial progress crosses a re-render
    ///   threshold
    /// * `enable_frame_reuse` - Whether to consult the cache at all
    pub fn new(
        volume: Weak<Volume>,
        fetcher: Arc<dyn FrameFetcher>,
        cache: Arc<dyn FrameCache>,
        metrics: Arc<LoadMetrics>,
        refresh_hook: Option<RefreshHook>,
        enable_frame_reuse: bool,
    ) -> Self {
        IngestionPipeline {
            volume,
            fetcher,
            cache,
            metrics,
            refresh_hook,
            enable_frame_reuse,
        }
    }

    /// Ingest one frame
    ///
    /// Never returns an error: per-frame failures are absorbed into the
    /// completion accounting and reported through the callback channel.
    pub async fn ingest(&self, request: FrameRequest) {
        let Some(volume) = self.volume.upgrade() else {
            debug!(frame_id = %request.frame_id, "volume released, dropping frame work");
            return;
        };

        {
            let status = volume.status().lock().unwrap();
            if !status.is_loading() || status.is_complete(request.frame_index) {
                return;
            }
        }

        let outcome = self.acquire_values(&volume, &request).await;

        // The fetch is the only suspension point; cancellation that landed
        // while it was in flight must not reach the buffer or the counters.
        {
            let status = volume.status().lock().unwrap();
            if status.is_cancelled() {
                debug!(
                    volume_id = volume.id(),
                    frame_index = request.frame_index,
                    "load cancelled mid-flight, discarding frame"
                );
                return;
            }
        }

        match outcome {
            Ok(values) => match volume.write_frame(request.frame_index, &values) {
                Ok(()) => self.complete(&volume, &request, true, None),
                Err(error) => {
                    warn!(
                        volume_id = volume.id(),
                        frame_index = request.frame_index,
                        %error,
                        "frame copy-in failed"
                    );
                    self.complete(&volume, &request, false, Some(error));
                }
            },
            Err(error) => {
                warn!(
                    volume_id = volume.id(),
                    frame_id = %request.frame_id,
                    %error,
                    "frame ingestion failed"
                );
                self.complete(&volume, &request, false, Some(error));
            }
        }
    }

    /// Produce the scaled working values for a frame, from the image-level
    /// cache when possible, from the fetcher otherwise
    async fn acquire_values(&self, volume: &Volume, request: &FrameRequest) -> Result<Vec<f32>> {
        if self.enable_frame_reuse {
            if let Some(cached) = self.cache.get(&request.frame_id) {
                let mut values = cached.decode();
                if values.len() != request.length {
                    return Err(VolumeError::DimensionMismatch {
                        expected: request.length,
                        actual: values.len(),
                    });
                }
                match &cached.scaling_applied {
                    // Already scaled: derive the correction algebraically,
                    // never scale twice with the same parameters.
                    Some(used) => {
                        if let Some(correction) = scaling::reconcile(used, &request.scaling) {
                            scaling::apply(&mut values, &correction);
                        }
                    }
                    None => scaling::apply(&mut values, &request.scaling),
                }
                debug!(frame_id = %request.frame_id, "reusing cached frame data");
                self.metrics.record_frame_reused(volume.bytes_per_frame());
                return Ok(values);
            }
        }

        let fetched = self
            .fetcher
            .fetch(&request.frame_id)
            .await
            .map_err(|error| match error {
                error @ VolumeError::FetchFailure { .. } => error,
                other => VolumeError::fetch_failure(request.frame_id.as_str(), other.to_string()),
            })?;

        let mut values = fetched.decode();
        if values.len() != request.length {
            return Err(VolumeError::DimensionMismatch {
                expected: request.length,
                actual: values.len(),
            });
        }
        scaling::apply(&mut values, &request.scaling);
        self.metrics.record_frame_fetched(volume.bytes_per_frame());
        Ok(values)
    }

    /// Account a processed frame and fan out events
    fn complete(
        &self,
        volume: &Arc<Volume>,
        request: &FrameRequest,
        success: bool,
        error: Option<VolumeError>,
    ) {
        let accounted = {
            let mut status = volume.status().lock().unwrap();
            if !status.mark_complete(request.frame_index, success) {
                // A duplicate completion for this frame already counted.
                return;
            }
            let finished = status.frames_processed() == status.total_frames();
            if finished {
                status.mark_loaded();
            }
            let refresh = status.advance_refresh();
            let progress = status.progress(success, error);
            let callbacks = if finished {
                status.drain_callbacks()
            } else {
                status.callbacks_snapshot()
            };
            (progress, callbacks, finished, refresh)
        };
        let (progress, callbacks, finished, refresh) = accounted;

        if !success {
            self.metrics.record_frame_failed();
        }

        for callback in &callbacks {
            callback(&progress);
        }

        if finished {
            self.metrics.record_load_completed();
            debug!(
                volume_id = volume.id(),
                frames_loaded = progress.frames_loaded,
                failed_frames = progress.total_frames - progress.frames_loaded,
                "volume load complete"
            );
        } else if refresh {
            if let Some(hook) = &self.refresh_hook {
                hook(volume.id());
            }
        }
    }
}
