// Integration tests for progressive behavior: re-render requests as
// partial data arrives, and 4-D volumes landing frames in the right time
// point buffers.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use voxelstream::{
    FetchQueue, FetchedFrame, FrameFetcher, FrameId, InMemoryFrameCache, LoadCallback,
    LoadController, LoadProgress, LoaderConfig, RefreshHook, ScalarType, UniformScaling, Volume,
    VolumeKind, VoxelDimensions,
};

struct IndexFetcher {
    elements: usize,
}

#[async_trait]
impl FrameFetcher for IndexFetcher {
    async fn fetch(&self, frame_id: &FrameId) -> voxelstream::Result<FetchedFrame> {
        let index: f32 = frame_id
            .as_str()
            .rsplit('-')
            .next()
            .unwrap()
            .parse()
            .unwrap();
        let data: Vec<u8> = std::iter::repeat(index)
            .take(self.elements)
            .flat_map(|v| v.to_le_bytes())
            .collect();
        Ok(FetchedFrame::new(Bytes::from(data), ScalarType::Float32))
    }
}

fn progress_channel() -> (LoadCallback, mpsc::UnboundedReceiver<LoadProgress>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: LoadCallback = Arc::new(move |progress: &LoadProgress| {
        let _ = tx.send(progress.clone());
    });
    (callback, rx)
}

async fn wait_complete(rx: &mut mpsc::UnboundedReceiver<LoadProgress>) {
    loop {
        let progress = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("load did not complete in time")
            .expect("progress channel closed");
        if progress.is_complete() {
            return;
        }
    }
}

#[tokio::test]
async fn test_refresh_hook_fires_during_load() {
    let volume = Arc::new(
        Volume::new(
            "ct-refresh",
            VoxelDimensions::new(2, 2, 40).unwrap(),
            VolumeKind::Static,
            ScalarType::Float32,
            ScalarType::Float32,
            (0..40)
                .map(|i| FrameId::new(format!("frame-{}", i)))
                .collect(),
        )
        .unwrap(),
    );

    // 10% steps over 40 frames: thresholds every 4 frames.
    let config = LoaderConfig {
        refresh_step_percent: 10.0,
        ..LoaderConfig::default()
    };
    let refreshes = Arc::new(AtomicU64::new(0));
    let counter = refreshes.clone();
    let hook: RefreshHook = Arc::new(move |volume_id: &str| {
        assert_eq!(volume_id, "ct-refresh");
        counter.fetch_add(1, Ordering::Relaxed);
    });

    let controller = LoadController::new(
        volume,
        Arc::new(FetchQueue::new(4)),
        Arc::new(IndexFetcher { elements: 4 }),
        Arc::new(InMemoryFrameCache::new(0)),
        Arc::new(UniformScaling::identity()),
        config,
    )
    .with_refresh_hook(hook);

    let (callback, mut rx) = progress_channel();
    controller.load(Some(callback));
    wait_complete(&mut rx).await;

    // Thresholds at 4, 8, ..., 36 are each exceeded once mid-load; the last
    // threshold coincides with completion, which reports through callbacks
    // instead of the hook.
    assert_eq!(refreshes.load(Ordering::Relaxed), 9);
}

#[tokio::test]
async fn test_dynamic_volume_places_frames_per_time_point() {
    let frames_per_tp = 3;
    let time_points = 4;
    let volume = Arc::new(
        Volume::new(
            "pt-dynamic",
            VoxelDimensions::new(2, 2, frames_per_tp).unwrap(),
            VolumeKind::Dynamic { time_points },
            ScalarType::Float32,
            ScalarType::Float32,
            (0..frames_per_tp * time_points)
                .map(|i| FrameId::new(format!("frame-{}", i)))
                .collect(),
        )
        .unwrap(),
    );
    volume.set_active_time_point(2).unwrap();

    let controller = LoadController::new(
        volume.clone(),
        Arc::new(FetchQueue::new(3)),
        Arc::new(IndexFetcher { elements: 4 }),
        Arc::new(InMemoryFrameCache::new(0)),
        Arc::new(UniformScaling::identity()),
        LoaderConfig::default(),
    );

    let (callback, mut rx) = progress_channel();
    controller.load(Some(callback));
    wait_complete(&mut rx).await;

    let status = controller.load_status();
    assert!(status.loaded);
    assert_eq!(status.frames_loaded, frames_per_tp * time_points);

    // Every frame landed in its own time point at its own offset.
    for index in 0..frames_per_tp * time_points {
        assert_eq!(volume.read_frame(index).unwrap(), vec![index as f32; 4]);
        let (tp, within) = volume.frame_index_to_time_point(index).unwrap();
        let buffer = volume.scalar_buffer(tp).unwrap();
        let region = buffer.read_region(within * 4, 4).unwrap();
        assert_eq!(region, vec![index as f32; 4]);
    }
}
