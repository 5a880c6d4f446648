// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! A delay source whose in-progress waits can be lifted without cancelling
//! future ones.
//!
//! [`CancellableDelay`] keeps a single slot holding the current inner
//! [`CancellationToken`], always a child of the parent token supplied at
//! construction. `delay` waits on a timer bound to the token it snapshots
//! from the slot; `cancel` swaps a fresh child token into the slot and only
//! then cancels the one it displaced. A cancelled token is one-shot and is
//! never reused, and a `delay` that snapshots the post-swap token cannot be
//! collaterally woken by a cancel that raced ahead of it.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{CoordError, Result};

/// Cancellable delay source. See the module docs for the swap protocol.
pub struct CancellableDelay {
    parent: CancellationToken,
    slot: ArcSwap<CancellationToken>,
}

impl CancellableDelay {
    /// Create a delay source linked to `parent`.
    pub fn new(parent: CancellationToken) -> Self {
        let inner = Arc::new(parent.child_token());
        Self {
            parent,
            slot: ArcSwap::from(inner),
        }
    }

    /// Suspend for at least `d`.
    ///
    /// Returns early with `Ok(())` if [`cancel`](Self::cancel) lifts the
    /// wait, and with [`CoordError::Cancelled`] if the parent token fired.
    pub async fn delay(&self, d: Duration) -> Result<()> {
        let token = self.snapshot();
        self.delay_on(&token, d).await
    }

    /// Wake every in-progress `delay`, leaving the source ready for new ones.
    ///
    /// No-op when the parent is already cancelled, or when another canceller
    /// swapped the slot first; in the latter case the racing canceller's
    /// trigger already woke the same waiters.
    pub fn cancel(&self) {
        if self.parent.is_cancelled() {
            return;
        }
        let current = self.slot.load_full();
        let fresh = Arc::new(self.parent.child_token());
        let prev = self.slot.compare_and_swap(&current, fresh);
        if Arc::ptr_eq(&*prev, &current) {
            current.cancel();
        }
    }

    /// Snapshot the current inner token.
    ///
    /// Callers that must not miss a wake-up between observing their own
    /// state and suspending take the snapshot first, then observe, then
    /// wait via [`delay_on`](Self::delay_on): the first `cancel` after the
    /// snapshot is guaranteed to trigger the snapshotted token.
    pub(crate) fn snapshot(&self) -> Arc<CancellationToken> {
        self.slot.load_full()
    }

    /// Wait on a previously snapshotted token.
    pub(crate) async fn delay_on(&self, token: &CancellationToken, d: Duration) -> Result<()> {
        tokio::select! {
            biased;

            _ = token.cancelled() => {
                if self.parent.is_cancelled() {
                    Err(CoordError::Cancelled)
                } else {
                    // Local wake-up, not a failure.
                    Ok(())
                }
            }

            _ = tokio::time::sleep(d) => Ok(()),
        }
    }
}
