// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The one-shot gesture broadcaster. Some playback backends may not produce
//! sound until a user-initiated interaction has been observed; this
//! decouples "playback was requested" from "playback is now permitted".

use parking_lot::Mutex;
use tracing::debug;

type UnlockCallback = Box<dyn FnOnce() + Send>;

struct UnlockState {
    unlocked: bool,
    pending: Vec<UnlockCallback>,
}

/// One-way unlock flag with a pending callback list. The transition to
/// unlocked happens exactly once per process and is never reversed.
pub struct GestureGate {
    inner: Mutex<UnlockState>,
}

impl Default for GestureGate {
    fn default() -> GestureGate {
        GestureGate::new()
    }
}

impl GestureGate {
    /// Creates a gate in the locked state.
    pub fn new() -> GestureGate {
        GestureGate {
            inner: Mutex::new(UnlockState {
                unlocked: false,
                pending: Vec::new(),
            }),
        }
    }

    /// Marks the first user gesture. The first call drains the pending
    /// callbacks synchronously; subsequent calls are no-ops.
    pub fn mark_unlocked(&self) {
        let pending = {
            let mut inner = self.inner.lock();
            if inner.unlocked {
                return;
            }
            inner.unlocked = true;
            std::mem::take(&mut inner.pending)
        };

        debug!(callbacks = pending.len(), "Audio unlocked by user gesture");
        // Run outside the lock so a callback may register further
        // callbacks (which now fire immediately).
        for callback in pending {
            callback();
        }
    }

    /// Runs the callback immediately if already unlocked, otherwise queues
    /// it for the unlock transition.
    pub fn on_unlock<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut inner = self.inner.lock();
            if !inner.unlocked {
                inner.pending.push(Box::new(callback));
                return;
            }
        }
        callback();
    }

    /// Whether the unlock gesture has been observed.
    pub fn is_unlocked(&self) -> bool {
        self.inner.lock().unlocked
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_pending_callbacks_fire_once() {
        let gate = GestureGate::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let count = count.clone();
            gate.on_unlock(move || {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!gate.is_unlocked());

        gate.mark_unlocked();
        assert!(gate.is_unlocked());
        assert_eq!(count.load(Ordering::SeqCst), 3);

        // Idempotent: a second unlock must not re-run anything.
        gate.mark_unlocked();
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_late_registration_fires_immediately() {
        let gate = GestureGate::new();
        gate.mark_unlocked();

        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        gate.on_unlock(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        // Synchronous: already incremented by the time on_unlock returns.
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_may_register_another() {
        let gate = Arc::new(GestureGate::new());
        let count = Arc::new(AtomicUsize::new(0));

        {
            let gate = gate.clone();
            let count = count.clone();
            gate.clone().on_unlock(move || {
                let count = count.clone();
                gate.on_unlock(move || {
                    count.fetch_add(1, Ordering::SeqCst);
                });
            });
        }

        gate.mark_unlocked();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
