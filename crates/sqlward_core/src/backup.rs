//! Backup and restore coordination.

use crate::error::{CoreError, CoreResult};
use crate::guard::StaleGuard;
use crate::progress::{percent_complete, OperationKind, ProgressTracker};
use sqlward_engine::{OpenFlags, SqlConnector, SqlEngine};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Drives online backups of the primary database.
///
/// At most one backup runs at a time. A call to
/// [`BackupCoordinator::start_backup`] while one is in flight is a
/// harmless observation: it returns the current progress instead of
/// starting a second run, so any number of sessions may issue the
/// command redundantly.
///
/// A successful run goes through the engine's online-backup primitive
/// (streaming progress into the shared [`ProgressTracker`]) and then
/// verifies the produced file with a fresh connection's integrity
/// check. Only after verification does progress read 100; any failure
/// resets it to idle.
pub struct BackupCoordinator {
    tracker: Arc<ProgressTracker>,
    connector: Arc<dyn SqlConnector>,
    guard: StaleGuard,
}

impl BackupCoordinator {
    /// Creates a coordinator sharing the given tracker and connector.
    #[must_use]
    pub fn new(tracker: Arc<ProgressTracker>, connector: Arc<dyn SqlConnector>) -> Self {
        let guard = StaleGuard::new(Arc::clone(&tracker), OperationKind::Backup);
        Self {
            tracker,
            connector,
            guard,
        }
    }

    /// Backs up the primary database (reached through `engine`) to
    /// `target`, returning the final progress value.
    ///
    /// If a backup is already running, returns its current progress
    /// without side effects. Otherwise exactly this caller drives the
    /// run to a terminal state and returns `Ok(100)` on verified
    /// completion.
    ///
    /// # Errors
    ///
    /// - [`CoreError::BackupEngine`] if the backup primitive fails or
    ///   the produced file cannot be opened for verification
    /// - [`CoreError::Integrity`] if the integrity check reports
    ///   corruption
    ///
    /// Progress is reset to idle on every error path.
    pub fn start_backup(&self, engine: &dyn SqlEngine, target: &Path) -> CoreResult<i64> {
        if !self.tracker.try_begin(OperationKind::Backup) {
            return Ok(self.tracker.get(OperationKind::Backup));
        }

        let tracker = &self.tracker;
        let ok = engine.backup_to(target, &mut |remaining, total| {
            let percent = percent_complete(remaining, total);
            tracker.advance(OperationKind::Backup, percent);
            debug!(percent, "backup in progress");
        });

        if !ok {
            self.tracker.reset(OperationKind::Backup);
            return Err(CoreError::backup_engine(format!(
                "backup to {} failed: {}",
                target.display(),
                engine.last_error()
            )));
        }

        // Verify the produced file through a fresh connection before
        // declaring the run complete.
        let backup = self.connector.connect(target);
        if !backup.open(OpenFlags::READ_WRITE) {
            let message = format!(
                "cannot open {} for integrity check: {}",
                target.display(),
                backup.last_error()
            );
            warn!(%message);
            self.tracker.reset(OperationKind::Backup);
            return Err(CoreError::backup_engine(message));
        }

        if !backup.integrity_check() {
            let message = format!(
                "integrity check failed for {}: {}",
                target.display(),
                backup.last_error()
            );
            warn!(%message);
            self.tracker.reset(OperationKind::Backup);
            return Err(CoreError::integrity(message));
        }

        debug!(target = %target.display(), "integrity check passed");
        self.tracker.complete(OperationKind::Backup);
        Ok(100)
    }

    /// Current backup progress; `-1` when idle.
    #[must_use]
    pub fn progress(&self) -> i64 {
        self.tracker.get(OperationKind::Backup)
    }

    /// Resets backup progress to idle.
    pub fn reset_progress(&self) {
        self.tracker.reset(OperationKind::Backup);
    }

    /// Arms the stale-guard timer; no-op while one is pending.
    pub fn arm_stale_guard(&self, timeout: Duration) {
        self.guard.arm(timeout);
    }

    /// Returns whether a backup file exists at `path`.
    ///
    /// Pure filesystem probe, independent of progress state.
    #[must_use]
    pub fn backup_exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Observable state of a restore run.
///
/// The data-movement side of restore lives with the session layer;
/// this type carries the shared state contract only.
pub struct RestoreCoordinator {
    tracker: Arc<ProgressTracker>,
    guard: StaleGuard,
}

impl RestoreCoordinator {
    /// Creates a coordinator sharing the given tracker.
    #[must_use]
    pub fn new(tracker: Arc<ProgressTracker>) -> Self {
        let guard = StaleGuard::new(Arc::clone(&tracker), OperationKind::Restore);
        Self { tracker, guard }
    }

    /// Current restore progress; `-1` when idle.
    #[must_use]
    pub fn progress(&self) -> i64 {
        self.tracker.get(OperationKind::Restore)
    }

    /// Returns whether a restore is currently executing.
    #[must_use]
    pub fn is_executing(&self) -> bool {
        self.progress() > 0
    }

    /// Resets restore progress to idle.
    pub fn reset_progress(&self) {
        self.tracker.reset(OperationKind::Restore);
    }

    /// Arms the stale-guard timer; no-op while one is pending.
    pub fn arm_stale_guard(&self, timeout: Duration) {
        self.guard.arm(timeout);
    }
}
