// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Time-bounded exclusive lock.
//!
//! The entire lock state is one atomic deadline: the lock is held exactly
//! while `now < next_available`. `obtain` wins by compare-and-swapping the
//! deadline forward from the exact value it observed; a loser returns
//! `false` with no queueing and no busy-wait.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::time::Duration;

use crate::clock::TickClock;

/// Exclusive lock that expires on its own after a fixed duration.
///
/// `obtain` returning `true` grants the lock for `lock_duration`; until that
/// span elapses (or [`release`](Self::release) is called) every other
/// `obtain` returns `false`. A zero duration is permitted and makes every
/// CAS winner succeed immediately.
#[derive(Debug)]
pub struct TimeLock {
    clock: TickClock,
    duration_ticks: u64,
    lock_duration: Duration,
    next_available: AtomicU64,
}

impl TimeLock {
    /// Create a lock that holds for `lock_duration` per successful `obtain`.
    pub fn new(lock_duration: Duration) -> Self {
        Self {
            clock: TickClock::new(),
            duration_ticks: TickClock::ticks(lock_duration),
            lock_duration,
            next_available: AtomicU64::new(0),
        }
    }

    /// Try to take the lock. Returns `false` while an unexpired hold exists
    /// or when a racing caller wins the deadline swap.
    pub fn obtain(&self) -> bool {
        let now = self.clock.now();
        let available_at = self.next_available.load(Ordering::Acquire);
        if now < available_at {
            return false;
        }
        self.next_available
            .compare_exchange(
                available_at,
                now + self.duration_ticks,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Clear the deadline unconditionally.
    pub fn release(&self) {
        self.next_available.store(0, Ordering::Release);
    }

    /// The hold duration granted per successful `obtain`.
    pub fn lock_duration(&self) -> Duration {
        self.lock_duration
    }
}
