// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Periodic runner.
//!
//! [`Poller`] invokes an async callback with a fixed pause between the end
//! of one invocation and the start of the next. The inter-run wait goes
//! through a [`CancellableDelay`], so [`wake`](Poller::wake) ends the
//! current wait early and a parent cancellation ends the loop at its next
//! suspension point. Callback failures are routed to the unhandled-failure
//! hook and never tear the loop down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::callback::JobFn;
use crate::delay::CancellableDelay;
use crate::error::{CoordError, Result};
use crate::failure::FailureHook;

/// Periodic async runner. Cheap to clone; clones share the same runner.
#[derive(Clone)]
pub struct Poller {
    inner: Arc<PollerInner>,
}

struct PollerInner {
    callback: JobFn,
    interval: Duration,
    parent: CancellationToken,
    delay: CancellableDelay,
    started: AtomicBool,
    busy: AtomicBool,
    completed: AtomicBool,
    cancelled: AtomicBool,
    failure: FailureHook,
}

impl Poller {
    /// Create a runner that invokes `callback` every `interval`, measured
    /// from the end of one invocation to the start of the next.
    pub fn new(callback: JobFn, interval: Duration, parent: CancellationToken) -> Self {
        let delay = CancellableDelay::new(parent.clone());
        Self {
            inner: Arc::new(PollerInner {
                callback,
                interval,
                parent,
                delay,
                started: AtomicBool::new(false),
                busy: AtomicBool::new(false),
                completed: AtomicBool::new(false),
                cancelled: AtomicBool::new(false),
                failure: FailureHook::default(),
            }),
        }
    }

    /// Start the loop with the first invocation running immediately.
    pub fn start(&self) -> Result<()> {
        self.start_inner(None)
    }

    /// Start the loop after an initial delay.
    ///
    /// A parent cancellation during the initial delay completes the runner
    /// without a single invocation.
    pub fn start_after(&self, initial_delay: Duration) -> Result<()> {
        self.start_inner(Some(initial_delay))
    }

    fn start_inner(&self, initial_delay: Option<Duration>) -> Result<()> {
        if self
            .inner
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CoordError::AlreadyStarted);
        }
        let inner = self.inner.clone();
        tokio::spawn(async move { inner.run(initial_delay).await });
        Ok(())
    }

    /// End the current inter-run wait early.
    pub fn wake(&self) -> Result<()> {
        if !self.inner.started.load(Ordering::Acquire) {
            return Err(CoordError::NotStarted);
        }
        self.inner.delay.cancel();
        Ok(())
    }

    /// Install the unhandled-failure handler. The handler returns `true`
    /// when it considers the failure handled.
    pub fn on_unhandled_failure<F>(&self, handler: F)
    where
        F: Fn(&anyhow::Error) -> bool + Send + Sync + 'static,
    {
        self.inner.failure.set(handler);
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::Acquire)
    }

    /// Best-effort observable: true while the callback is executing.
    pub fn is_busy(&self) -> bool {
        self.inner.busy.load(Ordering::Acquire)
    }

    pub fn is_active(&self) -> bool {
        self.is_started() && !self.is_completed()
    }

    pub fn is_completed(&self) -> bool {
        self.inner.completed.load(Ordering::Acquire)
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire) || self.inner.parent.is_cancelled()
    }
}

impl PollerInner {
    async fn run(self: Arc<Self>, initial_delay: Option<Duration>) {
        if let Some(d) = initial_delay {
            if self.delay.delay(d).await.is_err() {
                self.finish();
                return;
            }
        }
        loop {
            if self.parent.is_cancelled() {
                self.finish();
                return;
            }

            self.busy.store(true, Ordering::Release);
            let result = (self.callback)(self.parent.child_token()).await;
            self.busy.store(false, Ordering::Release);
            if let Err(err) = result {
                self.failure.dispatch(&self.parent, &err);
            }

            if self.parent.is_cancelled() {
                self.finish();
                return;
            }
            if self.delay.delay(self.interval).await.is_err() {
                self.finish();
                return;
            }
        }
    }

    /// The loop only ends on parent cancellation.
    fn finish(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.completed.store(true, Ordering::Release);
    }
}
