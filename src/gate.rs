// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Manual-reset and auto-reset gates.
//!
//! [`ManualGate`] releases every waiter when opened and stays open until
//! reset. [`AutoGate`] releases exactly one waiter per `set`, in FIFO order,
//! and stays open for a single pass-through when nobody is waiting.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{oneshot, Notify};

/// One open/closed generation of a [`ManualGate`].
///
/// Waiters hold the cell that was current when they called `wait`, so a
/// later `reset` swaps in a fresh cell without un-opening the gate for
/// anybody already waiting on (or woken by) the old one.
struct GateCell {
    open: AtomicBool,
    notify: Notify,
}

impl GateCell {
    fn new(open: bool) -> Self {
        Self {
            open: AtomicBool::new(open),
            notify: Notify::new(),
        }
    }
}

/// Manual-reset gate. Cheap to clone; clones share the same gate.
#[derive(Clone)]
pub struct ManualGate {
    cell: Arc<parking_lot::Mutex<Arc<GateCell>>>,
}

impl ManualGate {
    pub fn new(initially_open: bool) -> Self {
        Self {
            cell: Arc::new(parking_lot::Mutex::new(Arc::new(GateCell::new(
                initially_open,
            )))),
        }
    }

    /// Wait until the gate is open.
    pub async fn wait(&self) {
        let cell = self.cell.lock().clone();
        loop {
            // Register interest before re-checking so a concurrent `set`
            // between the check and the await cannot be missed.
            let notified = cell.notify.notified();
            if cell.open.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }

    /// Open the gate, releasing all current waiters. Idempotent.
    pub fn set(&self) {
        let cell = self.cell.lock().clone();
        cell.open.store(true, Ordering::Release);
        cell.notify.notify_waiters();
    }

    /// Close the gate again, iff it is currently open.
    ///
    /// Concurrent resets converge on a single swap: whichever reset observes
    /// the open cell replaces it, and the rest see an already-closed gate.
    pub fn reset(&self) {
        let mut slot = self.cell.lock();
        if slot.open.load(Ordering::Acquire) {
            *slot = Arc::new(GateCell::new(false));
        }
    }
}

/// Auto-reset gate. Cheap to clone; clones share the same gate.
#[derive(Clone)]
pub struct AutoGate {
    inner: Arc<parking_lot::Mutex<AutoGateState>>,
}

struct AutoGateState {
    /// Holds a stored signal only while the waiter queue is empty.
    signalled: bool,
    waiters: VecDeque<oneshot::Sender<()>>,
}

impl AutoGate {
    pub fn new(initially_open: bool) -> Self {
        Self {
            inner: Arc::new(parking_lot::Mutex::new(AutoGateState {
                signalled: initially_open,
                waiters: VecDeque::new(),
            })),
        }
    }

    /// Wait for one signal. A stored signal is consumed without suspending.
    pub async fn wait(&self) {
        let rx = {
            let mut state = self.inner.lock();
            if state.signalled {
                state.signalled = false;
                return;
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            rx
        };
        let _ = rx.await;
    }

    /// Release the first live waiter, or store the signal if none is
    /// waiting.
    pub fn set(&self) {
        let mut state = self.inner.lock();
        loop {
            match state.waiters.pop_front() {
                Some(tx) => {
                    if tx.send(()).is_ok() {
                        return;
                    }
                    // Abandoned waiter; the signal goes to the next one.
                }
                None => {
                    state.signalled = true;
                    return;
                }
            }
        }
    }
}
