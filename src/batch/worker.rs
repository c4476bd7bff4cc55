// Copyright 2026 Query Fan-out Engine Authors. Licensed under Apache-2.0.
// Bounded worker pool for Phase C dispatch, per §4.4/§5: "default width = 6,
// queue capacity = 100, rejection policy = run-on-caller for backpressure".
// Adapted from the teacher's `components/tikv_util/src/worker/pool.rs` and
// `yatp_pool/future_pool.rs`, but the underlying primitive had to change: the
// teacher's pool is a `yatp` callback pool, which has no async task type and
// so cannot host `ShardExecutor`'s `async fn`s directly. The async per-shard
// dispatch here is bounded by a semaphore instead.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{Semaphore, SemaphorePermit};

/// Bounds concurrent async shard dispatch to `width` in-flight tasks.
/// Overflow beyond `queue_capacity` waiting tasks is absorbed by
/// run-on-caller: the caller simply awaits its turn on the same semaphore
/// rather than being rejected, which is the backpressure behavior the spec
/// calls for.
pub struct ShardDispatcher {
    semaphore: Arc<Semaphore>,
    queue_capacity: usize,
    queued: AtomicUsize,
}

impl ShardDispatcher {
    pub fn new(width: usize, queue_capacity: usize) -> Self {
        ShardDispatcher {
            semaphore: Arc::new(Semaphore::new(width.max(1))),
            queue_capacity,
            queued: AtomicUsize::new(0),
        }
    }

    /// Acquires a dispatch slot, waiting (run-on-caller) if the pool is
    /// saturated. Returns the permit; the caller holds it for the duration
    /// of the shard task.
    pub async fn acquire(&self) -> SemaphorePermit<'_> {
        self.queued.fetch_add(1, Ordering::Relaxed);
        let permit = self.semaphore.acquire().await.expect("semaphore never closed");
        self.queued.fetch_sub(1, Ordering::Relaxed);
        permit
    }

    /// Exposes the underlying semaphore so a caller can acquire an owned
    /// permit (`acquire_owned`) before moving it into a `tokio::spawn`ed,
    /// `'static` task — `acquire` above borrows `self` and so cannot cross
    /// that boundary.
    pub fn semaphore(&self) -> Arc<Semaphore> {
        self.semaphore.clone()
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub fn queued_count(&self) -> usize {
        self.queued.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dispatcher_bounds_concurrency_to_configured_width() {
        let dispatcher = Arc::new(ShardDispatcher::new(2, 100));
        let concurrent = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let dispatcher = dispatcher.clone();
            let concurrent = concurrent.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _permit = dispatcher.acquire().await;
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                concurrent.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
