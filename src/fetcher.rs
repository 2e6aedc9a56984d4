//! Fetch-and-decode boundary
//!
//! Network retrieval and pixel decoding live behind this trait; the loader
//! only sees decoded frames. Implementations are expected to be cheap to
//! share (`Arc`) and safe to call concurrently up to the scheduler's
//! concurrency limit.

use crate::error::Result;
use crate::models::{FetchedFrame, FrameId};
use async_trait::async_trait;

/// External fetch-and-decode service
///
/// A failed fetch surfaces as `VolumeError::FetchFailure` for that frame
/// only; sibling frames keep loading.
#[async_trait]
pub trait FrameFetcher: Send + Sync {
    /// Retrieve and decode one frame
    async fn fetch(&self, frame_id: &FrameId) -> Result<FetchedFrame>;
}
