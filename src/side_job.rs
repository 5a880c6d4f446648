// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Coalescing deferred job.
//!
//! [`SideJob`] merges any number of run requests into single executions of
//! its callback. The whole schedule is one atomic `u64` slot:
//!
//! - `IDLE` (0): nothing requested, nothing running.
//! - a tick value `t`: run at or after `t`. Ticks start at 1, so a real
//!   deadline can never read as `IDLE`.
//! - `RUN_IMMEDIATE` (`u64::MAX - 2`): run now, ignoring the interval.
//! - `RUNNING` (`u64::MAX`): callback in progress, nothing further
//!   requested.
//! - `RUNNING_RESCHEDULE` (`u64::MAX - 1`): callback in progress and
//!   another run was requested during it.
//!
//! The sentinels sit far above any reachable tick count, so `deadline > now`
//! comparisons stay meaningful and every transition is a single
//! compare-and-swap that re-observes on failure. Exactly one transition can
//! move the slot out of `IDLE`, and that winner is the only place a driver
//! task is spawned; at any moment at most one driver exists.
//!
//! `wake` requests are strictly stronger than timed requests: a `wake`
//! overwrites any pending deadline, while a `delay` observing
//! `RUN_IMMEDIATE` yields.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::callback::JobFn;
use crate::clock::TickClock;
use crate::delay::CancellableDelay;
use crate::failure::FailureHook;

const IDLE: u64 = 0;
const RUNNING: u64 = u64::MAX;
const RUNNING_RESCHEDULE: u64 = u64::MAX - 1;
const RUN_IMMEDIATE: u64 = u64::MAX - 2;

/// Highest tick value a deadline may occupy.
const MAX_DEADLINE: u64 = RUN_IMMEDIATE - 1;

/// Coalescing deferred job. Cheap to clone; clones share the same job.
#[derive(Clone)]
pub struct SideJob {
    inner: Arc<SideJobInner>,
}

struct SideJobInner {
    callback: JobFn,
    interval: Duration,
    parent: CancellationToken,
    delay: CancellableDelay,
    clock: TickClock,
    schedule: AtomicU64,
    busy: AtomicBool,
    completed: AtomicBool,
    cancelled: AtomicBool,
    failure: FailureHook,
}

impl SideJob {
    /// Create a job that defers runs by `interval` unless woken.
    pub fn new(callback: JobFn, interval: Duration, parent: CancellationToken) -> Self {
        let delay = CancellableDelay::new(parent.clone());
        Self {
            inner: Arc::new(SideJobInner {
                callback,
                interval,
                parent,
                delay,
                clock: TickClock::new(),
                schedule: AtomicU64::new(IDLE),
                busy: AtomicBool::new(false),
                completed: AtomicBool::new(false),
                cancelled: AtomicBool::new(false),
                failure: FailureHook::default(),
            }),
        }
    }

    /// Request an immediate run, coalescing with any pending request.
    pub fn wake(&self) {
        self.inner.request_wake();
    }

    /// Request a run no earlier than the configured interval from now.
    pub fn delay(&self) {
        self.inner.request_delay(self.inner.interval);
    }

    /// Request a run no earlier than `d` from now.
    ///
    /// A pending earlier deadline is deferred to this one; a pending later
    /// deadline stands.
    pub fn delay_for(&self, d: Duration) {
        self.inner.request_delay(d);
    }

    /// Install the unhandled-failure handler. The handler returns `true`
    /// when it considers the failure handled.
    pub fn on_unhandled_failure<F>(&self, handler: F)
    where
        F: Fn(&anyhow::Error) -> bool + Send + Sync + 'static,
    {
        self.inner.failure.set(handler);
    }

    /// Best-effort observable: true while the callback is executing.
    pub fn is_busy(&self) -> bool {
        self.inner.busy.load(Ordering::Acquire)
    }

    pub fn is_completed(&self) -> bool {
        self.inner.completed.load(Ordering::Acquire)
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire) || self.inner.parent.is_cancelled()
    }
}

impl SideJobInner {
    /// True once the job no longer accepts requests.
    fn refuses(&self) -> bool {
        self.parent.is_cancelled() || self.completed.load(Ordering::Acquire)
    }

    fn request_wake(self: &Arc<Self>) {
        if self.refuses() {
            return;
        }
        let mut observed = self.schedule.load(Ordering::Acquire);
        loop {
            let target = match observed {
                RUN_IMMEDIATE | RUNNING_RESCHEDULE => return,
                RUNNING => RUNNING_RESCHEDULE,
                // IDLE or a pending deadline: an immediate run wins.
                _ => RUN_IMMEDIATE,
            };
            match self.schedule.compare_exchange(
                observed,
                target,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    match observed {
                        IDLE => self.spawn_driver(),
                        RUNNING => {}
                        // A driver is parked on the displaced deadline;
                        // lift its wait.
                        _ => self.delay.cancel(),
                    }
                    return;
                }
                Err(actual) => observed = actual,
            }
        }
    }

    fn request_delay(self: &Arc<Self>, d: Duration) {
        if self.refuses() {
            return;
        }
        let due = self
            .clock
            .now()
            .saturating_add(TickClock::ticks(d))
            .min(MAX_DEADLINE);
        let mut observed = self.schedule.load(Ordering::Acquire);
        loop {
            let target = match observed {
                IDLE => due,
                RUN_IMMEDIATE | RUNNING_RESCHEDULE => return,
                RUNNING => RUNNING_RESCHEDULE,
                deadline if deadline > due => return,
                // An earlier pending deadline is deferred to this one. The
                // sleeping driver re-observes when its old deadline fires.
                _ => due,
            };
            match self.schedule.compare_exchange(
                observed,
                target,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    if observed == IDLE {
                        self.spawn_driver();
                    }
                    return;
                }
                Err(actual) => observed = actual,
            }
        }
    }

    /// Only the transition that moved the slot out of `IDLE` spawns.
    fn spawn_driver(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.drive().await });
    }

    async fn drive(self: Arc<Self>) {
        loop {
            if self.parent.is_cancelled() {
                self.finish();
                return;
            }

            // Snapshot the wake token before observing the slot: the first
            // cancel after this point triggers exactly this token, so a
            // wake racing with the observation below cannot be slept
            // through.
            let wake_token = self.delay.snapshot();
            let observed = self.schedule.load(Ordering::Acquire);
            match observed {
                IDLE => return,
                RUNNING | RUNNING_RESCHEDULE => {
                    tracing::error!("duplicate side job dispatch, dropping this driver");
                    return;
                }
                RUN_IMMEDIATE => {}
                deadline => {
                    let now = self.clock.now();
                    if deadline > now {
                        let wait = TickClock::span(now, deadline);
                        match self.delay.delay_on(&wake_token, wait).await {
                            // Deadline reached or locally woken; re-observe.
                            Ok(()) => continue,
                            Err(_) => {
                                self.finish();
                                return;
                            }
                        }
                    }
                }
            }

            if self
                .schedule
                .compare_exchange(observed, RUNNING, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                // The slot moved between observation and entry; recompute.
                continue;
            }

            self.busy.store(true, Ordering::Release);
            let result = (self.callback)(self.parent.child_token()).await;
            self.busy.store(false, Ordering::Release);
            if let Err(err) = result {
                self.failure.dispatch(&self.parent, &err);
            }

            if self
                .schedule
                .compare_exchange(RUNNING, IDLE, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return;
            }
            // A request arrived during the run. Return to idle and re-arm
            // with the configured interval; the re-arm transition spawns
            // the next driver.
            let _ = self.schedule.compare_exchange(
                RUNNING_RESCHEDULE,
                IDLE,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            self.request_delay(self.interval);
            return;
        }
    }

    fn finish(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.completed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::job_fn;
    use std::sync::atomic::AtomicUsize;

    fn counting_job(
        interval: Duration,
        parent: CancellationToken,
    ) -> (SideJob, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let count_in_cb = count.clone();
        let job = SideJob::new(
            job_fn(move |_token| {
                let count = count_in_cb.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
            interval,
            parent,
        );
        (job, count)
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_requests_coalesce_into_one_run() {
        let (job, count) = counting_job(Duration::from_millis(50), CancellationToken::new());

        for _ in 0..1000 {
            job.delay();
        }

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Nothing further was requested; one run is all there is.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_delay_defers_pending_deadline() {
        let (job, count) = counting_job(Duration::from_millis(50), CancellationToken::new());

        job.delay();
        tokio::time::sleep(Duration::from_millis(30)).await;
        job.delay();

        // The original deadline at 50 ms must not fire.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_earlier_delay_does_not_advance_deadline() {
        let (job, count) = counting_job(Duration::from_millis(50), CancellationToken::new());

        job.delay_for(Duration::from_millis(200));
        job.delay_for(Duration::from_millis(50));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(110)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wake_runs_immediately_from_idle() {
        let (job, count) = counting_job(Duration::from_secs(10), CancellationToken::new());
        job.wake();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wake_preempts_pending_deadline() {
        let (job, count) = counting_job(Duration::from_secs(10), CancellationToken::new());

        job.delay();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        job.wake();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_wakes_coalesce() {
        let (job, count) = counting_job(Duration::from_millis(50), CancellationToken::new());
        job.wake();
        job.wake();
        job.wake();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wake_during_run_schedules_one_more() {
        let parent = CancellationToken::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_in_cb = count.clone();
        let job = SideJob::new(
            job_fn(move |_token| {
                let count = count_in_cb.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(())
                }
            }),
            Duration::from_millis(50),
            parent,
        );

        job.wake();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(job.is_busy());

        // Requested mid-run: coalesces into exactly one follow-up run,
        // rearmed on the configured interval after the current run ends.
        job.wake();
        job.wake();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Current run ends at 20 ms, follow-up starts at 70 ms.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_during_run_schedules_one_more() {
        let parent = CancellationToken::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_in_cb = count.clone();
        let job = SideJob::new(
            job_fn(move |_token| {
                let count = count_in_cb.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(())
                }
            }),
            Duration::from_millis(50),
            parent,
        );

        job.wake();
        tokio::time::sleep(Duration::from_millis(5)).await;
        job.delay();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refuses_requests_after_parent_cancel() {
        let parent = CancellationToken::new();
        let (job, count) = counting_job(Duration::from_millis(10), parent.clone());

        parent.cancel();
        job.wake();
        job.delay();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(job.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancel_during_pending_deadline() {
        let parent = CancellationToken::new();
        let (job, count) = counting_job(Duration::from_millis(50), parent.clone());

        job.delay();
        tokio::time::sleep(Duration::from_millis(10)).await;
        parent.cancel();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(job.is_completed());
        assert!(job.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_failure_routed_to_hook() {
        let parent = CancellationToken::new();
        let job = SideJob::new(
            job_fn(|_token| async move { anyhow::bail!("side job failed") }),
            Duration::from_millis(10),
            parent,
        );

        let failures = Arc::new(AtomicUsize::new(0));
        let failures_in_hook = failures.clone();
        job.on_unhandled_failure(move |_err| {
            failures_in_hook.fetch_add(1, Ordering::SeqCst);
            true
        });

        job.wake();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(failures.load(Ordering::SeqCst), 1);

        // A failed run still returns the job to a schedulable state.
        job.wake();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(failures.load(Ordering::SeqCst), 2);
    }
}
