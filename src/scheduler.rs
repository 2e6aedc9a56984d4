//! Priority scheduler boundary and the default tokio-backed queue
//!
//! `load()` is fire-and-forget: the controller hands each frame's
//! fetch-and-ingest closure to a scheduler and returns. The scheduler
//! contract is deliberately small — run each closure at most once,
//! eventually, honoring priority as a soft hint, and drop not-yet-started
//! work on request — so tests can substitute a deterministic in-process
//! implementation.

use std::cmp::Reverse;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, Semaphore};
use tracing::debug;

/// Boxed unit of asynchronous work
pub type WorkFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Scheduler contract consumed by the load controller
pub trait PriorityScheduler: Send + Sync {
    /// Queue a unit of work
    ///
    /// # Arguments
    /// * `request_id` - Identifier for logging and diagnostics
    /// * `priority` - Soft scheduling hint; higher runs earlier
    /// * `tag` - Cancellation scope, typically the owning volume's id
    /// * `work` - The closure to execute at most once
    fn submit(&self, request_id: String, priority: i32, tag: String, work: WorkFuture);

    /// Drop every queued unit of work carrying `tag` that has not yet
    /// started executing
    fn cancel_by_tag(&self, tag: &str);
}

struct QueuedWork {
    request_id: String,
    priority: i32,
    seq: u64,
    tag: String,
    work: WorkFuture,
}

struct QueueInner {
    pending: Mutex<Vec<QueuedWork>>,
    notify: Notify,
    semaphore: Arc<Semaphore>,
    seq: AtomicU64,
}

impl QueueInner {
    /// Pop the highest-priority pending item, FIFO among equal priorities
    fn pop_next(&self) -> Option<QueuedWork> {
        let mut pending = self.pending.lock().unwrap();
        if pending.is_empty() {
            return None;
        }
        let mut best = 0;
        for (index, work) in pending.iter().enumerate() {
            let current = (pending[best].priority, Reverse(pending[best].seq));
            if (work.priority, Reverse(work.seq)) > current {
                best = index;
            }
        }
        Some(pending.remove(best))
    }
}

/// Default in-process [`PriorityScheduler`]
///
/// A single dispatcher task pops pending work in priority order; a semaphore
/// bounds how many units execute concurrently. Work is only popped once
/// execution capacity is available, so everything still in the pending list
/// is reorderable and cancellable.
///
/// Must be constructed inside a tokio runtime.
pub struct FetchQueue {
    inner: Arc<QueueInner>,
    dispatcher: tokio::task::JoinHandle<()>,
}

impl FetchQueue {
    /// Create a queue executing at most `max_concurrent` units at a time
    pub fn new(max_concurrent: usize) -> Self {
        let inner = Arc::new(QueueInner {
            pending: Mutex::new(Vec::new()),
            notify: Notify::new(),
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            seq: AtomicU64::new(0),
        });

        let dispatch = inner.clone();
        let dispatcher = tokio::spawn(async move {
            loop {
                let permit = dispatch
                    .semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("semaphore closed");
                let item = loop {
                    match dispatch.pop_next() {
                        Some(item) => break item,
                        None => dispatch.notify.notified().await,
                    }
                };
                debug!(request_id = %item.request_id, priority = item.priority, "dispatching work");
                tokio::spawn(async move {
                    item.work.await;
                    drop(permit);
                });
            }
        });

        FetchQueue { inner, dispatcher }
    }

    /// Number of units queued but not yet started
    pub fn pending_len(&self) -> usize {
        self.inner.pending.lock().unwrap().len()
    }
}

impl PriorityScheduler for FetchQueue {
    fn submit(&self, request_id: String, priority: i32, tag: String, work: WorkFuture) {
        let seq = self.inner.seq.fetch_add(1, Ordering::Relaxed);
        self.inner.pending.lock().unwrap().push(QueuedWork {
            request_id,
            priority,
            seq,
            tag,
            work,
        });
        self.inner.notify.notify_one();
    }

    fn cancel_by_tag(&self, tag: &str) {
        let mut pending = self.inner.pending.lock().unwrap();
        let before = pending.len();
        pending.retain(|work| work.tag != tag);
        let dropped = before - pending.len();
        if dropped > 0 {
            debug!(tag, dropped, "cancelled pending work");
        }
    }
}

impl Drop for FetchQueue {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}
