//! Voxelstream
//!
//! A progressive streaming loader for volumetric image data: many 2-D
//! frames, fetched asynchronously, are assembled into one pre-allocated
//! contiguous scalar buffer per time point while the buffer stays readable
//! and the load stays cancellable.
//!
//! # Overview
//!
//! The crate owns the orchestration around frame loading, not the transport:
//! fetching and decoding a single frame is delegated to a [`FrameFetcher`]
//! supplied by the surrounding system. What lives here is byte-exact
//! placement of heterogeneously-typed, heterogeneously-scaled frame data
//! into a shared buffer, temporal interleaving for 4-D datasets, idempotent
//! reuse of already-resident frame data, exact progress accounting under
//! partial failure and cancellation, and eviction of a whole volume into
//! independently addressable per-frame cache entries under a byte budget.
//!
//! # Architecture
//!
//! - [`Volume`]: dimensions, frame ids, one scalar buffer per time point,
//!   and the load bookkeeping
//! - [`FrameRequestPlanner`]: turns the frame list into ordered fetch
//!   requests, interleaving time points for 4-D data
//! - [`IngestionPipeline`]: per-frame unit of work — reuse or fetch, scale,
//!   copy in, account completion, fan out events
//! - [`LoadController`]: public `load` / `cancel_loading` lifecycle
//! - [`DecacheCoordinator`]: full removal or budgeted demotion of frames
//!   into the image-level cache
//! - [`FetchQueue`]: default priority scheduler; any [`PriorityScheduler`]
//!   can be injected instead
//! - [`InMemoryFrameCache`]: default image-level [`FrameCache`]
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voxelstream::{
//!     FetchQueue, FrameFetcher, FrameId, InMemoryFrameCache, LoadCallback,
//!     LoadController, LoaderConfig, ScalarType, UniformScaling, Volume,
//!     VolumeKind, VoxelDimensions,
//! };
//!
//! # fn transport() -> Arc<dyn FrameFetcher> { unimplemented!() }
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dimensions = VoxelDimensions::new(512, 512, 120)?;
//! let frame_ids: Vec<FrameId> = (0..120)
//!     .map(|i| FrameId::new(format!("series/7/frame/{}", i)))
//!     .collect();
//! let volume = Arc::new(Volume::new(
//!     "ct-chest",
//!     dimensions,
//!     VolumeKind::Static,
//!     ScalarType::Int16,
//!     ScalarType::Float32,
//!     frame_ids,
//! )?);
//!
//! let config = LoaderConfig::default();
//! let controller = LoadController::new(
//!     volume.clone(),
//!     Arc::new(FetchQueue::new(config.max_concurrent_fetches)),
//!     transport(),
//!     Arc::new(InMemoryFrameCache::new(config.frame_cache_capacity_bytes)),
//!     Arc::new(UniformScaling::identity()),
//!     config,
//! );
//!
//! let on_progress: LoadCallback = Arc::new(|progress| {
//!     println!("{}/{} frames", progress.frames_loaded, progress.total_frames);
//! });
//! controller.load(Some(on_progress));
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Per-frame errors (fetch failures, dimension mismatches) are absorbed
//! into the completion accounting and reported through the callback channel;
//! a partially-failed load still terminates with `loaded == true` once every
//! frame has been processed. Construction-time and index errors are returned
//! synchronously as [`VolumeError`].
//!
//! # Concurrency
//!
//! Frame fetches overlap up to the scheduler's concurrency limit; the copy
//! into the shared buffer and the counter updates are synchronous once data
//! arrives. Writers land on disjoint per-frame byte ranges, while the
//! completion bitmap, counters, and callback list are guarded by one mutex
//! per volume. Frames may complete in any order; only the submission order
//! follows the planner's policy. Cancellation is cooperative: queued work is
//! dropped, in-flight work finishes its fetch and then discards the result.

pub mod cache;
pub mod config;
pub mod controller;
pub mod decache;
pub mod error;
pub mod fetcher;
pub mod ingestion;
pub mod metadata;
pub mod metrics;
pub mod models;
pub mod planner;
pub mod registry;
pub mod scaling;
pub mod scheduler;
pub mod volume;

// Re-export commonly used types
pub use cache::{CacheStats, CachedFrame, FrameCache, InMemoryFrameCache};
pub use config::LoaderConfig;
pub use controller::LoadController;
pub use decache::DecacheCoordinator;
pub use error::{Result, VolumeError};
pub use fetcher::FrameFetcher;
pub use ingestion::IngestionPipeline;
pub use metadata::{MetadataProvider, UniformScaling};
pub use metrics::{LoadMetrics, MetricsSnapshot};
pub use models::{
    FetchedFrame, FrameId, FrameRequest, LoadCallback, LoadProgress, RefreshHook, ScalarType,
    ScalingParameters, VolumeKind, VoxelDimensions,
};
pub use planner::{interleaved_time_points, FrameRequestPlanner};
pub use registry::VolumeRegistry;
pub use scheduler::{FetchQueue, PriorityScheduler, WorkFuture};
pub use volume::{LoadStatus, LoadStatusSnapshot, ScalarBuffer, Volume};
