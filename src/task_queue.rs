// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Bounded worker pool over a lock-free FIFO.
//!
//! [`TaskQueue`] drains a [`SegQueue`] with at most `max_workers` concurrent
//! workers. Enqueues prod the pool; a prod claims a worker slot with an
//! increment-then-check on the in-flight counter, so a burst of concurrent
//! prods can momentarily over-increment but never over-spawn. Workers decrement
//! on exit and prod once more to cover items that slipped in between their
//! last empty pop and the decrement.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_queue::SegQueue;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::callback::ItemFn;
use crate::error::{CoordError, Result};
use crate::failure::FailureHook;

/// Bounded worker pool. Cheap to clone; clones share the same pool.
pub struct TaskQueue<T: Send + 'static> {
    inner: Arc<TaskQueueInner<T>>,
}

impl<T: Send + 'static> Clone for TaskQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct TaskQueueInner<T> {
    callback: ItemFn<T>,
    max_workers: usize,
    /// Pause between items; only meaningful with a single worker.
    interval: Option<Duration>,
    parent: CancellationToken,
    queue: SegQueue<T>,
    /// Approximate length for monitoring, not exact under concurrency.
    len: AtomicUsize,
    in_flight: AtomicUsize,
    failure: FailureHook,
}

impl<T: Send + 'static> TaskQueue<T> {
    /// Create a pool invoking `callback` once per dequeued item, with at
    /// most `max_workers` items in flight.
    ///
    /// An `interval` inserts a pause between items and requires
    /// `max_workers == 1`; with more workers there is no single stream of
    /// items for the pause to apply to.
    pub fn new(
        callback: ItemFn<T>,
        max_workers: usize,
        interval: Option<Duration>,
        parent: CancellationToken,
    ) -> Result<Self> {
        if max_workers == 0 {
            return Err(CoordError::InvalidArgument("max_workers must be at least 1"));
        }
        if interval.is_some() && max_workers > 1 {
            return Err(CoordError::InvalidArgument(
                "an inter-item interval requires a single worker",
            ));
        }
        Ok(Self {
            inner: Arc::new(TaskQueueInner {
                callback,
                max_workers,
                interval,
                parent,
                queue: SegQueue::new(),
                len: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                failure: FailureHook::default(),
            }),
        })
    }

    /// Append one item and prod the pool. Refused after parent cancellation.
    pub fn enqueue(&self, item: T) {
        if self.inner.parent.is_cancelled() {
            return;
        }
        self.inner.queue.push(item);
        self.inner.len.fetch_add(1, Ordering::Relaxed);
        self.inner.prod();
    }

    /// Append a batch of items, prodding the pool once.
    pub fn enqueue_many<I>(&self, items: I)
    where
        I: IntoIterator<Item = T>,
    {
        if self.inner.parent.is_cancelled() {
            return;
        }
        for item in items {
            self.inner.queue.push(item);
            self.inner.len.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.prod();
    }

    /// Install the unhandled-failure handler. The handler returns `true`
    /// when it considers the failure handled.
    pub fn on_unhandled_failure<F>(&self, handler: F)
    where
        F: Fn(&anyhow::Error) -> bool + Send + Sync + 'static,
    {
        self.inner.failure.set(handler);
    }

    /// Approximate number of queued (not yet dequeued) items.
    pub fn count(&self) -> usize {
        self.inner.len.load(Ordering::Relaxed)
    }

    /// Best-effort observable: true while items are queued or in flight.
    pub fn is_active(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire) > 0 || !self.inner.queue.is_empty()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.parent.is_cancelled()
    }
}

impl<T: Send + 'static> TaskQueueInner<T> {
    /// Spawn workers until the cap is reached or the queue drains.
    fn prod(self: &Arc<Self>) {
        while !self.parent.is_cancelled() && !self.queue.is_empty() {
            let claimed = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
            if claimed > self.max_workers {
                self.in_flight.fetch_sub(1, Ordering::AcqRel);
                return;
            }
            let inner = Arc::clone(self);
            tokio::spawn(async move { inner.work().await });
        }
    }

    async fn work(self: Arc<Self>) {
        while !self.parent.is_cancelled() {
            let Some(item) = self.queue.pop() else {
                break;
            };
            self.len.fetch_sub(1, Ordering::Relaxed);

            if let Err(err) = (self.callback)(item, self.parent.child_token()).await {
                self.failure.dispatch(&self.parent, &err);
            }

            if let Some(pause) = self.interval {
                tokio::select! {
                    biased;
                    _ = self.parent.cancelled() => break,
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.prod();
    }
}
