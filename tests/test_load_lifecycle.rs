// Integration tests for the load lifecycle: end-to-end ingestion through
// the real fetch queue, idempotent re-load, partial failure, and progress
// reporting.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use voxelstream::{
    FetchQueue, FetchedFrame, FrameFetcher, FrameId, InMemoryFrameCache, LoadCallback,
    LoadController, LoadProgress, LoaderConfig, ScalarType, UniformScaling, Volume, VolumeError,
    VolumeKind, VoxelDimensions,
};

/// Fetcher returning a constant frame value parsed from the frame id, with
/// an optional set of frame ids that fail
struct ValueFetcher {
    elements: usize,
    failing: HashSet<String>,
    calls: AtomicU64,
}

impl ValueFetcher {
    fn new(elements: usize) -> Self {
        ValueFetcher {
            elements,
            failing: HashSet::new(),
            calls: AtomicU64::new(0),
        }
    }

    fn with_failures(elements: usize, failing: &[&str]) -> Self {
        ValueFetcher {
            elements,
            failing: failing.iter().map(|s| s.to_string()).collect(),
            calls: AtomicU64::new(0),
        }
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl FrameFetcher for ValueFetcher {
    async fn fetch(&self, frame_id: &FrameId) -> voxelstream::Result<FetchedFrame> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.failing.contains(frame_id.as_str()) {
            return Err(VolumeError::fetch_failure(frame_id.as_str(), "unreachable"));
        }
        let value: f32 = frame_id
            .as_str()
            .rsplit('-')
            .next()
            .unwrap()
            .parse()
            .unwrap();
        let data: Vec<u8> = std::iter::repeat(value)
            .take(self.elements)
            .flat_map(|v| v.to_le_bytes())
            .collect();
        Ok(FetchedFrame::new(Bytes::from(data), ScalarType::Float32))
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Five-frame volume whose frames carry constant values 1 through 5
fn five_frame_volume() -> Arc<Volume> {
    Arc::new(
        Volume::new(
            "ct-5",
            VoxelDimensions::new(4, 4, 5).unwrap(),
            VolumeKind::Static,
            ScalarType::Float32,
            ScalarType::Float32,
            (1..=5).map(|v| FrameId::new(format!("frame-{}", v))).collect(),
        )
        .unwrap(),
    )
}

fn controller_for(volume: Arc<Volume>, fetcher: Arc<ValueFetcher>) -> LoadController {
    LoadController::new(
        volume,
        Arc::new(FetchQueue::new(4)),
        fetcher,
        Arc::new(InMemoryFrameCache::new(0)),
        Arc::new(UniformScaling::identity()),
        LoaderConfig::default(),
    )
}

fn progress_channel() -> (LoadCallback, mpsc::UnboundedReceiver<LoadProgress>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: LoadCallback = Arc::new(move |progress: &LoadProgress| {
        let _ = tx.send(progress.clone());
    });
    (callback, rx)
}

async fn wait_complete(rx: &mut mpsc::UnboundedReceiver<LoadProgress>) -> Vec<LoadProgress> {
    let mut events = Vec::new();
    loop {
        let progress = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("load did not complete in time")
            .expect("progress channel closed");
        let complete = progress.is_complete();
        events.push(progress);
        if complete {
            return events;
        }
    }
}

#[tokio::test]
async fn test_end_to_end_five_frames() {
    init_tracing();
    let volume = five_frame_volume();
    let fetcher = Arc::new(ValueFetcher::new(16));
    let controller = controller_for(volume.clone(), fetcher.clone());
    let (callback, mut rx) = progress_channel();

    controller.load(Some(callback));
    wait_complete(&mut rx).await;

    let status = controller.load_status();
    assert!(status.loaded);
    assert!(!status.loading);
    assert_eq!(status.frames_loaded, 5);

    // Frame index 3 carries the constant value 4.
    assert_eq!(volume.read_frame(3).unwrap(), vec![4.0; 16]);
    for index in 0..5 {
        let expected = (index + 1) as f32;
        assert_eq!(volume.read_frame(index).unwrap(), vec![expected; 16]);
    }
    assert_eq!(fetcher.calls(), 5);
}

#[tokio::test]
async fn test_reload_is_idempotent() {
    let volume = five_frame_volume();
    let fetcher = Arc::new(ValueFetcher::new(16));
    let controller = controller_for(volume, fetcher.clone());

    let (callback, mut rx) = progress_channel();
    controller.load(Some(callback));
    wait_complete(&mut rx).await;
    assert_eq!(fetcher.calls(), 5);

    // Two more loads: each invokes its callback synchronously with the
    // fully loaded result and issues no fetches.
    for _ in 0..2 {
        let (callback, mut rx) = progress_channel();
        controller.load(Some(callback));
        let progress = rx.try_recv().expect("callback must fire synchronously");
        assert!(progress.success);
        assert_eq!(progress.frames_loaded, 5);
        assert_eq!(progress.frames_processed, 5);
        assert_eq!(progress.total_frames, 5);
    }
    assert_eq!(fetcher.calls(), 5);
}

#[tokio::test]
async fn test_partial_failure_still_terminates() {
    let volume = five_frame_volume();
    let fetcher = Arc::new(ValueFetcher::with_failures(16, &["frame-2", "frame-4"]));
    let controller = controller_for(volume.clone(), fetcher.clone());
    let (callback, mut rx) = progress_channel();

    controller.load(Some(callback));
    let events = wait_complete(&mut rx).await;

    let status = controller.load_status();
    assert!(status.loaded);
    assert_eq!(status.frames_loaded, 3);
    assert_eq!(status.failed_frames, 2);
    assert_eq!(status.frames_processed, 5);

    // Failed frames report their error through the callback channel.
    let failures: Vec<&LoadProgress> = events.iter().filter(|p| !p.success).collect();
    assert_eq!(failures.len(), 2);
    assert!(failures
        .iter()
        .all(|p| matches!(p.error, Some(VolumeError::FetchFailure { .. }))));

    // Failed frames keep their zeroed region; frame-2 is frame index 1.
    assert_eq!(volume.read_frame(1).unwrap(), vec![0.0; 16]);
    assert_eq!(volume.read_frame(0).unwrap(), vec![1.0; 16]);
}

#[tokio::test]
async fn test_progress_counts_are_monotonic() {
    let volume = five_frame_volume();
    let fetcher = Arc::new(ValueFetcher::new(16));
    let controller = controller_for(volume, fetcher);
    let (callback, mut rx) = progress_channel();

    controller.load(Some(callback));
    let events = wait_complete(&mut rx).await;

    assert_eq!(events.len(), 5);
    for (i, window) in events.windows(2).enumerate() {
        assert!(
            window[0].frames_processed < window[1].frames_processed,
            "event {} did not advance",
            i
        );
    }
    assert_eq!(events.last().unwrap().frames_processed, 5);
}

#[tokio::test]
async fn test_dimension_mismatch_is_frame_local() {
    let volume = five_frame_volume();
    // Fetcher returns 8 elements; the volume expects 16 per frame.
    let fetcher = Arc::new(ValueFetcher::new(8));
    let controller = controller_for(volume, fetcher);
    let (callback, mut rx) = progress_channel();

    controller.load(Some(callback));
    let events = wait_complete(&mut rx).await;

    let status = controller.load_status();
    assert!(status.loaded);
    assert_eq!(status.frames_loaded, 0);
    assert_eq!(status.failed_frames, 5);
    assert!(events
        .iter()
        .all(|p| matches!(p.error, Some(VolumeError::DimensionMismatch { .. }))));
}

#[tokio::test]
async fn test_metrics_reflect_load() {
    let volume = five_frame_volume();
    let fetcher = Arc::new(ValueFetcher::with_failures(16, &["frame-5"]));
    let controller = controller_for(volume, fetcher);
    let (callback, mut rx) = progress_channel();

    controller.load(Some(callback));
    wait_complete(&mut rx).await;

    let snapshot = controller.metrics_snapshot();
    assert_eq!(snapshot.loads_started, 1);
    assert_eq!(snapshot.loads_completed, 1);
    assert_eq!(snapshot.frames_fetched, 4);
    assert_eq!(snapshot.frames_failed, 1);
}
