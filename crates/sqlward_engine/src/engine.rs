//! SQL engine trait definitions.

use std::path::Path;

/// Flags controlling how a connection is opened.
///
/// Models the open-flag sets of an embedded SQL driver: whether the
/// database file may be created if absent, and whether the connection
/// serializes access internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    /// Open for reading and writing.
    pub read_write: bool,
    /// Create the database file if it does not exist.
    pub create: bool,
    /// Serialize access to the connection internally.
    pub full_mutex: bool,
}

impl OpenFlags {
    /// Read-write, no creation. Opening a missing database fails.
    pub const READ_WRITE: Self = Self {
        read_write: true,
        create: false,
        full_mutex: true,
    };

    /// Read-write, creating the database file if absent.
    pub const READ_WRITE_CREATE: Self = Self {
        read_write: true,
        create: true,
        full_mutex: true,
    };
}

impl Default for OpenFlags {
    fn default() -> Self {
        Self::READ_WRITE_CREATE
    }
}

/// A cursor over the rows of a select statement.
///
/// Positioned before the first row; call [`ResultCursor::advance`] to
/// step. Releasing the underlying statement happens on drop.
pub trait ResultCursor {
    /// Advances to the next row. Returns `false` when no rows remain.
    fn advance(&mut self) -> bool;

    /// Returns the text of column `i` in the current row, or `None`
    /// for a null cell.
    fn column_text(&self, i: usize) -> Option<String>;

    /// Number of columns in the result.
    fn column_count(&self) -> usize;
}

/// A connection to an embedded SQL database.
///
/// # Failure signalling
///
/// The contract is driver-shaped rather than `Result`-shaped: `execute`
/// reports failure as a negative affected-row count, `execute_select`
/// as `None`, `open` / `backup_to` / `integrity_check` as `false`. The
/// human-readable reason for the most recent failure is available from
/// [`SqlEngine::last_error`].
///
/// # Invariants
///
/// - `backup_to` invokes its progress callback synchronously from
///   within the call; the callback must not block on I/O
/// - engines must be `Send + Sync` for concurrent access
pub trait SqlEngine: Send + Sync {
    /// Opens the connection with the given flags.
    fn open(&self, flags: OpenFlags) -> bool;

    /// Executes a statement, returning the affected-row count.
    ///
    /// A negative count signals failure.
    fn execute(&self, sql: &str) -> i64;

    /// Executes a select, returning a cursor over its rows.
    ///
    /// `None` signals failure.
    fn execute_select(&self, sql: &str) -> Option<Box<dyn ResultCursor + '_>>;

    /// Runs the engine's online-backup primitive, copying this database
    /// to `path`.
    ///
    /// `on_progress` receives `(remaining, total)` work counts as the
    /// copy proceeds. Returns `false` on failure.
    fn backup_to(&self, path: &Path, on_progress: &mut dyn FnMut(i64, i64)) -> bool;

    /// Runs the engine's built-in integrity check on this database.
    fn integrity_check(&self) -> bool;

    /// Returns the identifier assigned by the most recent insert.
    fn last_insert_id(&self) -> i64;

    /// Returns the error text of the most recent failure.
    fn last_error(&self) -> String;
}

/// Produces connections to databases addressed by filesystem path.
///
/// Connections come back **unopened**; callers open them with explicit
/// [`OpenFlags`] and inspect `last_error` on failure. Two connections
/// to the same path observe the same database.
pub trait SqlConnector: Send + Sync {
    /// Creates an unopened connection handle for `path`.
    fn connect(&self, path: &Path) -> Box<dyn SqlEngine>;
}
