// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Monotonic tick source for deadline arithmetic.
//!
//! Ticks are microseconds elapsed since the owning primitive was created,
//! offset by one so that tick 0 is never observed. Tick 0 is reserved: it is
//! the released state of a time lock and the idle state of a side job
//! schedule slot. Built on [`tokio::time::Instant`] so paused-clock tests
//! drive deadlines deterministically.

use tokio::time::{Duration, Instant};

/// Per-instance monotonic clock measured in whole microseconds.
#[derive(Debug)]
pub(crate) struct TickClock {
    epoch: Instant,
}

impl TickClock {
    pub(crate) fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Current tick. Always at least 1.
    pub(crate) fn now(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64 + 1
    }

    /// Number of ticks spanned by `d`.
    pub(crate) fn ticks(d: Duration) -> u64 {
        d.as_micros() as u64
    }

    /// Duration covering the span from `from` up to `to` ticks.
    pub(crate) fn span(from: u64, to: u64) -> Duration {
        Duration::from_micros(to.saturating_sub(from))
    }
}
