// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Asynchronous coordination primitives.
//!
//! Building blocks for expressing waiting, mutual exclusion, signalling,
//! periodic work, coalesced deferred work, and bounded-parallelism draining
//! on top of a tokio runtime, without blocking threads while idle:
//!
//! - [`CancellableDelay`]: a delay source whose in-progress waits can be
//!   lifted without disturbing later ones.
//! - [`TimeLock`]: a lock that expires on its own after a fixed duration,
//!   held in a single atomic deadline.
//! - [`AsyncMutex`]: FIFO mutual exclusion whose acquisitions yield a
//!   single-use [`MutexReleaser`].
//! - [`ManualGate`] / [`AutoGate`]: manual-reset and auto-reset events.
//! - [`Poller`]: periodic callback invocation with an end-to-start interval.
//! - [`SideJob`]: coalesces bursts of run requests into single deferred
//!   executions via one atomic schedule slot.
//! - [`TaskQueue`]: bounded worker pool draining a lock-free FIFO.
//!
//! Every primitive is built around a parent [`CancellationToken`]: waiting
//! operations surface [`CoordError::Cancelled`] when it fires, runner loops
//! wind down at their next suspension point, and callbacks receive a child
//! token so long-running work can observe the shutdown. Timeouts are
//! composed the same way, by handing a primitive a token the caller
//! triggers itself; there is no built-in timeout wrapper.
//!
//! Lifecycle observables (`is_busy`, `is_active`, and friends) are
//! best-effort hints for monitoring, not synchronization points.

pub mod callback;
mod clock;
pub mod delay;
pub mod error;
mod failure;
pub mod gate;
pub mod logging;
pub mod mutex;
pub mod poller;
pub mod side_job;
pub mod task_queue;
pub mod time_lock;

pub use callback::{item_fn, job_fn, ItemFn, JobFn};
pub use delay::CancellableDelay;
pub use error::{CoordError, Result};
pub use gate::{AutoGate, ManualGate};
pub use mutex::{AsyncMutex, MutexReleaser};
pub use poller::Poller;
pub use side_job::SideJob;
pub use task_queue::TaskQueue;
pub use time_lock::TimeLock;

pub use tokio_util::sync::CancellationToken;
