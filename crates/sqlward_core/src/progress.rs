//! Shared backup/restore progress state.

use parking_lot::RwLock;

/// Progress value meaning no operation is running.
pub const IDLE: i64 = -1;

/// The kind of long-running operation being tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Online backup of the primary database.
    Backup,
    /// Restore of the primary database from a backup file.
    Restore,
}

/// Computes a completion percentage from `(remaining, total)` work
/// counts as reported by the engine's backup callback.
///
/// The engine may report a total of zero at intermediate steps; it is
/// treated as one so the division can never fault.
#[must_use]
pub fn percent_complete(remaining: i64, total: i64) -> i64 {
    let total = if total == 0 { 1 } else { total };
    100 * (total - remaining) / total
}

/// Tracks backup and restore progress for any number of concurrent
/// readers.
///
/// Each kind holds an integer in `{-1} ∪ [0, 100]`:
///
/// - `-1` - idle, no operation running
/// - `0..=99` - in progress; 99 is the ceiling for values reported by
///   the backup callback, so that `100` can only ever mean a run that
///   passed post-backup verification
/// - `100` - confirmed complete
///
/// Reads take a shared lock and never block each other; only the one
/// coordinator driving a run writes.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    backup: RwLock<i64>,
    restore: RwLock<i64>,
}

impl ProgressTracker {
    /// Creates a tracker with both kinds idle.
    #[must_use]
    pub fn new() -> Self {
        Self {
            backup: RwLock::new(IDLE),
            restore: RwLock::new(IDLE),
        }
    }

    fn cell(&self, kind: OperationKind) -> &RwLock<i64> {
        match kind {
            OperationKind::Backup => &self.backup,
            OperationKind::Restore => &self.restore,
        }
    }

    /// Returns whether no operation of this kind is running.
    #[must_use]
    pub fn is_idle(&self, kind: OperationKind) -> bool {
        *self.cell(kind).read() == IDLE
    }

    /// Snapshot read of the current progress value.
    #[must_use]
    pub fn get(&self, kind: OperationKind) -> i64 {
        *self.cell(kind).read()
    }

    /// Marks the start of a run. The caller must already hold
    /// exclusivity for this kind (see `BackupCoordinator`).
    pub fn begin(&self, kind: OperationKind) {
        *self.cell(kind).write() = 0;
    }

    /// Atomically begins a run if this kind is idle.
    ///
    /// Returns `false` without touching the value when a run is
    /// already in flight; the check and the transition happen under
    /// one write lock, so concurrent callers cannot both win.
    pub fn try_begin(&self, kind: OperationKind) -> bool {
        let mut value = self.cell(kind).write();
        if *value == IDLE {
            *value = 0;
            true
        } else {
            false
        }
    }

    /// Advances in-flight progress, clamped into `0..=99`.
    ///
    /// A computed 100 before verification is reported as 99; `100` is
    /// reserved for [`ProgressTracker::complete`].
    pub fn advance(&self, kind: OperationKind, percent: i64) {
        *self.cell(kind).write() = percent.clamp(0, 99);
    }

    /// Marks the run confirmed complete, including verification.
    pub fn complete(&self, kind: OperationKind) {
        *self.cell(kind).write() = 100;
    }

    /// Resets progress back to idle. Used on failure, cancellation and
    /// by the stale guard.
    pub fn reset(&self, kind: OperationKind) {
        *self.cell(kind).write() = IDLE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[test]
    fn starts_idle() {
        let tracker = ProgressTracker::new();
        assert!(tracker.is_idle(OperationKind::Backup));
        assert!(tracker.is_idle(OperationKind::Restore));
        assert_eq!(tracker.get(OperationKind::Backup), IDLE);
    }

    #[test]
    fn kinds_are_independent() {
        let tracker = ProgressTracker::new();
        tracker.begin(OperationKind::Backup);
        tracker.advance(OperationKind::Backup, 40);

        assert_eq!(tracker.get(OperationKind::Backup), 40);
        assert!(tracker.is_idle(OperationKind::Restore));
    }

    #[test]
    fn advance_clamps_computed_hundred_to_99() {
        let tracker = ProgressTracker::new();
        tracker.begin(OperationKind::Backup);
        tracker.advance(OperationKind::Backup, 100);
        assert_eq!(tracker.get(OperationKind::Backup), 99);
    }

    #[test]
    fn complete_reports_100() {
        let tracker = ProgressTracker::new();
        tracker.begin(OperationKind::Backup);
        tracker.complete(OperationKind::Backup);
        assert_eq!(tracker.get(OperationKind::Backup), 100);
        assert!(!tracker.is_idle(OperationKind::Backup));
    }

    #[test]
    fn try_begin_wins_only_once() {
        let tracker = ProgressTracker::new();
        assert!(tracker.try_begin(OperationKind::Backup));
        assert!(!tracker.try_begin(OperationKind::Backup));
        assert_eq!(tracker.get(OperationKind::Backup), 0);

        tracker.reset(OperationKind::Backup);
        assert!(tracker.try_begin(OperationKind::Backup));
    }

    #[test]
    fn reset_returns_to_idle() {
        let tracker = ProgressTracker::new();
        tracker.begin(OperationKind::Restore);
        tracker.advance(OperationKind::Restore, 55);
        tracker.reset(OperationKind::Restore);
        assert!(tracker.is_idle(OperationKind::Restore));
    }

    #[test]
    fn percent_complete_survives_zero_total() {
        assert_eq!(percent_complete(0, 0), 100);
        assert_eq!(percent_complete(5, 10), 50);
        assert_eq!(percent_complete(10, 10), 0);
    }

    #[test]
    fn concurrent_readers_observe_whole_values() {
        let tracker = Arc::new(ProgressTracker::new());
        tracker.begin(OperationKind::Backup);

        let writer = {
            let tracker = Arc::clone(&tracker);
            std::thread::spawn(move || {
                for percent in 0..=100 {
                    tracker.advance(OperationKind::Backup, percent);
                }
                tracker.complete(OperationKind::Backup);
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let value = tracker.get(OperationKind::Backup);
                        assert!((0..=100).contains(&value));
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(tracker.get(OperationKind::Backup), 100);
    }

    proptest! {
        #[test]
        fn percent_complete_is_bounded(remaining in 0i64..=1_000_000, total in 0i64..=1_000_000) {
            prop_assume!(remaining <= total);
            let percent = percent_complete(remaining, total);
            prop_assert!((0..=100).contains(&percent));
        }

        #[test]
        fn advanced_progress_never_reads_100(percent in 0i64..=200) {
            let tracker = ProgressTracker::new();
            tracker.begin(OperationKind::Backup);
            tracker.advance(OperationKind::Backup, percent);
            prop_assert!(tracker.get(OperationKind::Backup) < 100);
        }
    }
}
