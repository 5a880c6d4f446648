// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the coordination primitives.
//!
//! Structural errors (bad arguments, lifecycle misuse) are fatal to the
//! caller. [`CoordError::Cancelled`] surfaces from a waiting operation only
//! when the parent cancellation token fired; a locally cancelled delay is an
//! internal wake-up and never escapes as an error.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CoordError>;

/// Errors produced by the coordination primitives.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CoordError {
    /// A constructor argument is out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// `start` was called on a poller that is already running.
    #[error("poller already started")]
    AlreadyStarted,

    /// `wake` was called on a poller that was never started.
    #[error("poller not started")]
    NotStarted,

    /// The parent cancellation token fired while waiting.
    #[error("operation cancelled")]
    Cancelled,
}
