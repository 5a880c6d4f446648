// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! FIFO asynchronous mutual exclusion.
//!
//! Acquisition yields a [`MutexReleaser`], a single-use capability that
//! returns the mutex on its first `release` (or on drop, whichever comes
//! first) and is a no-op afterwards. Releasing hands ownership directly to
//! the head of the waiter queue; waiters that abandoned their `acquire`
//! future are skipped. The mutex is not reentrant.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;

/// Asynchronous FIFO mutex. Cheap to clone; clones share the same lock.
#[derive(Clone)]
pub struct AsyncMutex {
    inner: Arc<MutexInner>,
}

struct MutexInner {
    state: parking_lot::Mutex<MutexState>,
}

struct MutexState {
    /// True only while no holder exists and the waiter queue is empty.
    signalled: bool,
    waiters: VecDeque<oneshot::Sender<MutexReleaser>>,
}

impl AsyncMutex {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MutexInner {
                state: parking_lot::Mutex::new(MutexState {
                    signalled: true,
                    waiters: VecDeque::new(),
                }),
            }),
        }
    }

    /// Wait for exclusive ownership.
    ///
    /// Waiters are granted ownership in the order they called `acquire`.
    /// Dropping the returned future before it resolves abandons the wait;
    /// an abandoned waiter never blocks the hand-off chain.
    pub async fn acquire(&self) -> MutexReleaser {
        let rx = {
            let mut state = self.inner.state.lock();
            if state.signalled {
                state.signalled = false;
                return MutexReleaser::new(self.inner.clone());
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            rx
        };
        // The sender lives inside the mutex state, which outlives this
        // borrow of the mutex, so the channel cannot close unresolved.
        rx.await.expect("mutex state dropped while a waiter was queued")
    }
}

impl Default for AsyncMutex {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-use release capability for one acquisition of an [`AsyncMutex`].
pub struct MutexReleaser {
    inner: Arc<MutexInner>,
    released: AtomicBool,
}

impl MutexReleaser {
    fn new(inner: Arc<MutexInner>) -> Self {
        Self {
            inner,
            released: AtomicBool::new(false),
        }
    }

    /// Release the mutex, passing ownership to the first live waiter.
    pub fn release(self) {
        self.do_release();
    }

    fn do_release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut state = self.inner.state.lock();
        loop {
            match state.waiters.pop_front() {
                Some(tx) => {
                    let next = MutexReleaser::new(self.inner.clone());
                    match tx.send(next) {
                        Ok(()) => return,
                        Err(stale) => {
                            // The waiter abandoned its acquire. Defuse the
                            // undelivered releaser so its drop does not
                            // re-enter the state lock, and try the next one.
                            stale.released.store(true, Ordering::Release);
                        }
                    }
                }
                None => {
                    state.signalled = true;
                    return;
                }
            }
        }
    }
}

impl Drop for MutexReleaser {
    fn drop(&mut self) {
        self.do_release();
    }
}
