//! Stale-progress safety timer.

use crate::progress::{OperationKind, ProgressTracker};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Cancellation token for one pending timer.
struct Cancel {
    cancelled: Mutex<bool>,
    cv: Condvar,
}

/// One-shot timer that force-resets progress stuck in a non-terminal
/// state.
///
/// A coordinator that never reaches a terminal state (a wedged caller,
/// a driver that never returns) would leave its progress value
/// non-idle forever, making every later `start_backup` call a no-op
/// observation. Arming the guard schedules a single background wait;
/// when it fires, any still non-idle progress of the guarded kind is
/// reset to idle. It does not stop whatever database operation may
/// still be in flight - only the observable state is recovered.
///
/// At most one timer is outstanding per guard: re-arming while one is
/// pending is a no-op. The timer fires once and self-disarms, so the
/// guard can be armed again afterwards.
pub struct StaleGuard {
    tracker: Arc<ProgressTracker>,
    kind: OperationKind,
    pending: Arc<Mutex<Option<Arc<Cancel>>>>,
}

impl StaleGuard {
    /// Creates a guard for one progress kind. Nothing is scheduled
    /// until [`StaleGuard::arm`] is called.
    #[must_use]
    pub fn new(tracker: Arc<ProgressTracker>, kind: OperationKind) -> Self {
        Self {
            tracker,
            kind,
            pending: Arc::new(Mutex::new(None)),
        }
    }

    /// Arms the timer. No-op if one is already pending.
    ///
    /// Firing is safe even if the guarded operation completed
    /// normally in the meantime: the current state is checked first,
    /// and an idle value is left alone.
    pub fn arm(&self, timeout: Duration) {
        let mut pending = self.pending.lock();
        if pending.is_some() {
            return;
        }

        let token = Arc::new(Cancel {
            cancelled: Mutex::new(false),
            cv: Condvar::new(),
        });
        *pending = Some(Arc::clone(&token));
        drop(pending);

        let tracker = Arc::clone(&self.tracker);
        let kind = self.kind;
        let slot = Arc::clone(&self.pending);
        std::thread::spawn(move || {
            let deadline = Instant::now() + timeout;
            let mut cancelled = token.cancelled.lock();
            while !*cancelled {
                if token.cv.wait_until(&mut cancelled, deadline).timed_out() {
                    break;
                }
            }
            let fire = !*cancelled;
            drop(cancelled);

            if fire && !tracker.is_idle(kind) {
                warn!(?kind, "stale-guard timeout, resetting progress");
                tracker.reset(kind);
            }

            // Self-disarm, unless a newer timer already took the slot.
            let mut pending = slot.lock();
            if pending
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, &token))
            {
                *pending = None;
            }
        });
    }

    /// Cancels a pending timer without firing it. No-op when none is
    /// pending.
    pub fn disarm(&self) {
        if let Some(token) = self.pending.lock().take() {
            *token.cancelled.lock() = true;
            token.cv.notify_all();
        }
    }

    /// Returns whether a timer is currently pending.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.pending.lock().is_some()
    }
}

impl std::fmt::Debug for StaleGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaleGuard")
            .field("kind", &self.kind)
            .field("armed", &self.is_armed())
            .finish()
    }
}
