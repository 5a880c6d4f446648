// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Routing for callback failures inside the runner primitives.
//!
//! A runner's job is resilience: a failing callback must not tear the loop
//! down. Failures are offered to an optional handler installed with
//! `on_unhandled_failure`; the handler returns `true` when it considers the
//! failure handled. Unhandled failures are logged at `warn` and dropped so
//! the loop continues.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio_util::sync::CancellationToken;

use crate::error::CoordError;

type Handler = Box<dyn Fn(&anyhow::Error) -> bool + Send + Sync>;

/// Swappable failure-handler slot shared by the runner primitives.
#[derive(Default)]
pub(crate) struct FailureHook {
    handler: ArcSwapOption<Handler>,
}

impl FailureHook {
    /// Install the handler, replacing any previous one.
    pub(crate) fn set<F>(&self, handler: F)
    where
        F: Fn(&anyhow::Error) -> bool + Send + Sync + 'static,
    {
        let handler: Handler = Box::new(handler);
        self.handler.store(Some(Arc::new(handler)));
    }

    /// Offer a callback failure to the installed handler.
    ///
    /// A cancellation error observed while the parent token is cancelled is
    /// an expected shutdown artifact, never a fault, and is dropped without
    /// being offered.
    pub(crate) fn dispatch(&self, parent: &CancellationToken, err: &anyhow::Error) {
        if parent.is_cancelled() && is_cancellation(err) {
            return;
        }
        if let Some(handler) = self.handler.load_full() {
            if (*handler)(err) {
                return;
            }
        }
        tracing::warn!(error = %err, "unhandled callback failure, continuing");
    }
}

fn is_cancellation(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| matches!(cause.downcast_ref::<CoordError>(), Some(CoordError::Cancelled)))
}
