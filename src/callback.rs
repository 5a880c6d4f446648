// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Stored callback types for the runner primitives.
//!
//! Runners hold their work as `Arc<dyn Fn(..) -> BoxFuture>` so a single
//! callback can be dispatched many times from spawned driver tasks. Each
//! invocation receives a child [`CancellationToken`] linked to the runner's
//! parent; long-running callbacks observe cancellation through it.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

/// Async callback invoked by [`Poller`](crate::Poller) and
/// [`SideJob`](crate::SideJob).
pub type JobFn =
    Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Async callback invoked by [`TaskQueue`](crate::TaskQueue) once per
/// dequeued item.
pub type ItemFn<T> =
    Arc<dyn Fn(T, CancellationToken) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Wrap an async closure as a [`JobFn`].
pub fn job_fn<F, Fut>(f: F) -> JobFn
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |token| f(token).boxed())
}

/// Wrap an async closure as an [`ItemFn`].
pub fn item_fn<T, F, Fut>(f: F) -> ItemFn<T>
where
    F: Fn(T, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |item, token| f(item, token).boxed())
}
