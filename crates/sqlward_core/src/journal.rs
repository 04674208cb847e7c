//! Durable side-store for writes deferred during a backup.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use parking_lot::Mutex;
use sqlward_engine::{OpenFlags, SqlConnector};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Schema of the journal store: one table of pending write statements
/// in arrival order (rowid), each stamped on insert.
const SCHEMA: &str = "CREATE TABLE pending_writes(\n    \
    query TEXT NOT NULL,\n    \
    timestamp DATETIME DEFAULT CURRENT_TIMESTAMP\n);";

/// A durable, file-backed queue of write statements.
///
/// While a backup snapshot is being taken, the session layer routes
/// writes here instead of the primary database; the journal survives
/// process restarts and is drained by [`crate::JournalReplayer`] once
/// the backup is done.
pub struct WriteJournal {
    connector: Arc<dyn SqlConnector>,
    journal_path: PathBuf,
    /// Serializes first-time schema creation across sessions.
    init: Mutex<()>,
}

impl WriteJournal {
    /// Creates a journal handle over the configured store path.
    ///
    /// Nothing is opened or created until
    /// [`WriteJournal::ensure_ready`].
    #[must_use]
    pub fn new(connector: Arc<dyn SqlConnector>, config: &Config) -> Self {
        Self {
            connector,
            journal_path: config.journal_path.clone(),
            init: Mutex::new(()),
        }
    }

    /// Opens the journal store, creating it and its schema on first
    /// use.
    ///
    /// Idempotent and safe to call from any number of sessions
    /// concurrently: at most one creates the schema, the rest observe
    /// the existing store.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] if the store can neither be
    /// opened nor created, or if schema creation fails.
    pub fn ensure_ready(&self) -> CoreResult<()> {
        let _init = self.init.lock();

        let journal = self.connector.connect(&self.journal_path);
        if journal.open(OpenFlags::READ_WRITE) {
            return Ok(());
        }

        debug!(path = %self.journal_path.display(), "journal store absent, creating");
        if !journal.open(OpenFlags::READ_WRITE_CREATE) {
            return Err(CoreError::storage(format!(
                "cannot open or create journal at {}: {}",
                self.journal_path.display(),
                journal.last_error()
            )));
        }

        if journal.execute(SCHEMA) < 0 {
            return Err(CoreError::storage(format!(
                "cannot create journal schema: {}",
                journal.last_error()
            )));
        }

        Ok(())
    }

    /// Appends one write statement, returning the engine's insert
    /// identifier.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] if the store cannot be opened or
    /// the insert fails.
    pub fn enqueue(&self, statement: &str) -> CoreResult<i64> {
        let journal = self.connector.connect(&self.journal_path);
        if !journal.open(OpenFlags::READ_WRITE) {
            return Err(CoreError::storage(format!(
                "cannot open journal at {}: {}",
                self.journal_path.display(),
                journal.last_error()
            )));
        }

        let escaped = statement.replace('\'', "''");
        let insert = format!("INSERT INTO pending_writes (query) VALUES ('{escaped}');");
        if journal.execute(&insert) < 0 {
            return Err(CoreError::storage(format!(
                "cannot append to journal: {}",
                journal.last_error()
            )));
        }

        Ok(journal.last_insert_id())
    }
}
