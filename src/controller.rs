//! Load lifecycle controller
//!
//! The public surface for loading a volume: plan requests, submit them to
//! the injected scheduler, queue callbacks while a load is in flight, and
//! cancel cooperatively. The state machine is
//! `NotLoading -> Loading -> {Loaded | Cancelled}`; `Cancelled` ends one
//! attempt only, and a later `load()` resumes from whatever frames already
//! completed.

use crate::cache::FrameCache;
use crate::config::LoaderConfig;
use crate::fetcher::FrameFetcher;
use crate::ingestion::IngestionPipeline;
use crate::metadata::MetadataProvider;
use crate::metrics::{LoadMetrics, MetricsSnapshot};
use crate::models::{FrameRequest, LoadCallback, RefreshHook};
use crate::planner::FrameRequestPlanner;
use crate::scheduler::{PriorityScheduler, WorkFuture};
use crate::volume::{LoadStatusSnapshot, Volume};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Coordinates one volume's load/cancel lifecycle
pub struct LoadController {
    volume: Arc<Volume>,
    scheduler: Arc<dyn PriorityScheduler>,
    fetcher: Arc<dyn FrameFetcher>,
    cache: Arc<dyn FrameCache>,
    metadata: Arc<dyn MetadataProvider>,
    config: LoaderConfig,
    metrics: Arc<LoadMetrics>,
    pipeline: Arc<IngestionPipeline>,
}

impl LoadController {
    /// Create a controller for one volume
    ///
    /// All collaborators are injected; nothing is looked up through ambient
    /// global state, so tests can substitute a deterministic scheduler or an
    /// in-process fetcher.
    pub fn new(
        volume: Arc<Volume>,
        scheduler: Arc<dyn PriorityScheduler>,
        fetcher: Arc<dyn FrameFetcher>,
        cache: Arc<dyn FrameCache>,
        metadata: Arc<dyn MetadataProvider>,
        config: LoaderConfig,
    ) -> Self {
        let metrics = Arc::new(LoadMetrics::new());
        let pipeline = Arc::new(IngestionPipeline::new(
            Arc::downgrade(&volume),
            fetcher.clone(),
            cache.clone(),
            metrics.clone(),
            None,
            config.enable_frame_reuse,
        ));
        LoadController {
            volume,
            scheduler,
            fetcher,
            cache,
            metadata,
            config,
            metrics,
            pipeline,
        }
    }

    /// Attach a hook fired when partial progress crosses a re-render
    /// threshold
    pub fn with_refresh_hook(mut self, hook: RefreshHook) -> Self {
        self.pipeline = Arc::new(IngestionPipeline::new(
            Arc::downgrade(&self.volume),
            self.fetcher.clone(),
            self.cache.clone(),
            self.metrics.clone(),
            Some(hook),
            self.config.enable_frame_reuse,
        ));
        self
    }

    /// Start loading with the configured default priority
    ///
    /// Fire-and-forget; progress and completion arrive through `callback`.
    pub fn load(&self, callback: Option<LoadCallback>) {
        self.load_with_priority(callback, self.config.default_priority);
    }

    /// Start loading
    ///
    /// - Already loaded: `callback` is invoked synchronously with the fully
    ///   loaded result and nothing is submitted.
    /// - Already loading: `callback` joins the pending list of the in-flight
    ///   attempt.
    /// - Otherwise the volume transitions to `Loading` and one request per
    ///   incomplete frame is submitted to the scheduler, tagged with the
    ///   volume's id.
    pub fn load_with_priority(&self, callback: Option<LoadCallback>, priority: i32) {
        let planned = {
            let mut status = self.volume.status().lock().unwrap();
            if status.is_loaded() {
                let progress = status.progress(true, None);
                drop(status);
                debug!(volume_id = self.volume.id(), "load requested on loaded volume");
                if let Some(callback) = callback {
                    callback(&progress);
                }
                return;
            }
            if status.is_loading() {
                debug!(volume_id = self.volume.id(), "load already in flight, queueing callback");
                if let Some(callback) = callback {
                    status.push_callback(callback);
                }
                return;
            }

            status.begin_loading(self.config.refresh_step_frames(self.volume.frame_count()));
            if let Some(callback) = callback {
                status.push_callback(callback);
            }
            FrameRequestPlanner::plan(&self.volume, &status, self.metadata.as_ref(), priority)
        };

        let requests = match planned {
            Ok(requests) => requests,
            Err(error) => {
                warn!(volume_id = self.volume.id(), %error, "request planning failed");
                let mut status = self.volume.status().lock().unwrap();
                status.set_cancelled();
                status.clear_callbacks();
                return;
            }
        };

        if requests.is_empty() {
            self.finish_without_requests();
            return;
        }

        self.metrics.record_load_started();
        info!(
            volume_id = self.volume.id(),
            requests = requests.len(),
            priority,
            "starting volume load"
        );
        for request in requests {
            self.submit(request);
        }
    }

    fn submit(&self, request: FrameRequest) {
        let request_id = format!("{}:frame-{}", self.volume.id(), request.frame_index);
        let priority = request.priority;
        let pipeline = self.pipeline.clone();
        let work: WorkFuture = Box::pin(async move {
            pipeline.ingest(request).await;
        });
        self.scheduler
            .submit(request_id, priority, self.volume.id().to_string(), work);
    }

    /// Every frame was complete at planning time; finish synchronously so
    /// queued callbacks still fire exactly once.
    fn finish_without_requests(&self) {
        let (progress, callbacks) = {
            let mut status = self.volume.status().lock().unwrap();
            status.mark_loaded();
            (status.progress(true, None), status.drain_callbacks())
        };
        for callback in &callbacks {
            callback(&progress);
        }
        self.metrics.record_load_completed();
    }

    /// Cancel the in-flight load attempt
    ///
    /// No-op when not loading. Pending callbacks are cleared so nothing
    /// stale fires after cancellation; queued-but-unstarted requests are
    /// dropped from the scheduler. Work already past its fetch completes the
    /// fetch but skips mutation.
    pub fn cancel_loading(&self) {
        {
            let mut status = self.volume.status().lock().unwrap();
            if !status.is_loading() {
                return;
            }
            status.set_cancelled();
            status.clear_callbacks();
        }
        self.scheduler.cancel_by_tag(self.volume.id());
        self.metrics.record_load_cancelled();
        info!(volume_id = self.volume.id(), "volume load cancelled");
    }

    /// Snapshot of the volume's load state
    pub fn load_status(&self) -> LoadStatusSnapshot {
        self.volume.load_status()
    }

    pub fn volume(&self) -> &Arc<Volume> {
        &self.volume
    }

    /// Shared metrics collector, for wiring into a decache coordinator
    pub fn metrics(&self) -> Arc<LoadMetrics> {
        self.metrics.clone()
    }

    /// Snapshot of the loader metrics
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
