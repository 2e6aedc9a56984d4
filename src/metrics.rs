//! Metrics collection for the volume loader
//!
//! Thread-safe counters using atomic operations; one collector is shared
//! between the controller, the ingestion pipeline, and the decache
//! coordinator.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics collector for load and decache activity
#[derive(Debug, Default)]
pub struct LoadMetrics {
    // Lifecycle
    loads_started: AtomicU64,
    loads_completed: AtomicU64,
    loads_cancelled: AtomicU64,

    // Frame outcomes
    frames_fetched: AtomicU64,
    frames_reused: AtomicU64,
    frames_failed: AtomicU64,

    // Byte statistics
    bytes_copied: AtomicU64,

    // Decache
    frames_decached: AtomicU64,
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub loads_started: u64,
    pub loads_completed: u64,
    pub loads_cancelled: u64,
    pub frames_fetched: u64,
    pub frames_reused: u64,
    pub frames_failed: u64,
    pub bytes_copied: u64,
    pub frames_decached: u64,
}

impl LoadMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_load_started(&self) {
        self.loads_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load_completed(&self) {
        self.loads_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load_cancelled(&self) {
        self.loads_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a frame ingested from a fresh fetch
    pub fn record_frame_fetched(&self, bytes: usize) {
        self.frames_fetched.fetch_add(1, Ordering::Relaxed);
        self.bytes_copied.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record a frame ingested from the image-level cache
    pub fn record_frame_reused(&self, bytes: usize) {
        self.frames_reused.fetch_add(1, Ordering::Relaxed);
        self.bytes_copied.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_frame_failed(&self) {
        self.frames_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_decached(&self) {
        self.frames_decached.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all current values
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            loads_started: self.loads_started.load(Ordering::Relaxed),
            loads_completed: self.loads_completed.load(Ordering::Relaxed),
            loads_cancelled: self.loads_cancelled.load(Ordering::Relaxed),
            frames_fetched: self.frames_fetched.load(Ordering::Relaxed),
            frames_reused: self.frames_reused.load(Ordering::Relaxed),
            frames_failed: self.frames_failed.load(Ordering::Relaxed),
            bytes_copied: self.bytes_copied.load(Ordering::Relaxed),
            frames_decached: self.frames_decached.load(Ordering::Relaxed),
        }
    }
}
