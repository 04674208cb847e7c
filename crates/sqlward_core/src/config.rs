//! Core configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the write-coordination core.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path of the journal store, created on first use.
    pub journal_path: PathBuf,

    /// Pause between replay iterations, yielding to sessions that are
    /// still appending.
    pub drain_pause: Duration,

    /// How long a backup or restore may stay non-idle before the
    /// stale guard force-resets its progress.
    pub stale_guard_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            journal_path: PathBuf::from("pending_writes.db"),
            drain_pause: Duration::from_millis(200),
            stale_guard_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the journal store path.
    #[must_use]
    pub fn journal_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.journal_path = path.into();
        self
    }

    /// Sets the pause between replay iterations.
    #[must_use]
    pub const fn drain_pause(mut self, pause: Duration) -> Self {
        self.drain_pause = pause;
        self
    }

    /// Sets the stale-guard timeout.
    #[must_use]
    pub const fn stale_guard_timeout(mut self, timeout: Duration) -> Self {
        self.stale_guard_timeout = timeout;
        self
    }
}
