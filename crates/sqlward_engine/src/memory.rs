//! In-memory SQL engine for testing.

use crate::engine::{OpenFlags, ResultCursor, SqlConnector, SqlEngine};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A result set: rows of nullable text cells.
type Rows = Vec<Vec<Option<String>>>;

/// Shared state of one in-memory database.
#[derive(Debug, Clone, Default)]
struct DbState {
    /// Whether the `pending_writes` table exists.
    table_created: bool,
    /// Rows of the `pending_writes` table: (rowid, query, timestamp).
    journal_rows: Vec<(i64, String, String)>,
    /// Next rowid to assign.
    next_rowid: i64,
    /// Statements applied through the generic execute path, in order.
    applied: Vec<String>,
    /// Scripted affected-row counts keyed by exact statement text.
    execute_script: HashMap<String, i64>,
    /// Scripted result sets keyed by exact query text, consumed front
    /// to back; the last one is sticky.
    select_script: HashMap<String, VecDeque<Rows>>,
    /// Scripted `(remaining, total)` steps for the backup callback.
    backup_steps: Vec<(i64, i64)>,
    /// Number of times the backup primitive was invoked.
    backup_calls: usize,
    /// Whether the backup primitive reports success.
    backup_ok: bool,
    /// Whether the integrity check reports success.
    integrity_ok: bool,
}

impl DbState {
    fn new() -> Self {
        Self {
            next_rowid: 1,
            backup_steps: vec![(2, 4), (0, 4)],
            backup_ok: true,
            integrity_ok: true,
            ..Self::default()
        }
    }
}

type Registry = RwLock<HashMap<PathBuf, Arc<Mutex<DbState>>>>;

/// Produces [`MemoryEngine`] connections backed by a shared registry.
///
/// The registry maps paths to database states, so two connections to
/// the same path observe the same data and `backup_to` can materialize
/// a copy under the target path - a small in-process filesystem of
/// databases.
///
/// Test scripting lives here: canned select results, forced execute
/// failures, backup progress sequences and integrity verdicts are
/// attached per path before the code under test connects.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    registry: Arc<Registry>,
}

impl MemoryConnector {
    /// Creates a connector with an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the database at `path` if it does not exist yet.
    ///
    /// Useful to pre-create a database so a plain read-write open
    /// succeeds without the create flag.
    pub fn create_db(&self, path: &Path) {
        self.state(path);
    }

    fn state(&self, path: &Path) -> Arc<Mutex<DbState>> {
        let mut registry = self.registry.write();
        Arc::clone(
            registry
                .entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(Mutex::new(DbState::new()))),
        )
    }

    /// Returns whether a database exists at `path`.
    #[must_use]
    pub fn db_exists(&self, path: &Path) -> bool {
        self.registry.read().contains_key(path)
    }

    /// Scripts the affected-row count returned for an exact statement.
    ///
    /// Scripted statements short-circuit the native journal-table
    /// handling, so a negative count models a failing insert or delete.
    pub fn script_execute(&self, path: &Path, sql: &str, affected: i64) {
        let db = self.state(path);
        db.lock().execute_script.insert(sql.to_string(), affected);
    }

    /// Scripts a result set for an exact query, queued behind any
    /// previously scripted sets for the same query.
    pub fn script_select(&self, path: &Path, sql: &str, rows: Rows) {
        let db = self.state(path);
        db.lock()
            .select_script
            .entry(sql.to_string())
            .or_default()
            .push_back(rows);
    }

    /// Scripts the backup primitive: progress steps and verdict.
    pub fn script_backup(&self, path: &Path, steps: Vec<(i64, i64)>, ok: bool) {
        let db = self.state(path);
        let mut state = db.lock();
        state.backup_steps = steps;
        state.backup_ok = ok;
    }

    /// Scripts the integrity-check verdict for the database at `path`.
    pub fn script_integrity(&self, path: &Path, ok: bool) {
        let db = self.state(path);
        db.lock().integrity_ok = ok;
    }

    /// Statements applied at `path` through the generic execute path.
    #[must_use]
    pub fn applied(&self, path: &Path) -> Vec<String> {
        match self.registry.read().get(path) {
            Some(db) => db.lock().applied.clone(),
            None => Vec::new(),
        }
    }

    /// Number of times the backup primitive ran at `path`.
    #[must_use]
    pub fn backup_calls(&self, path: &Path) -> usize {
        match self.registry.read().get(path) {
            Some(db) => db.lock().backup_calls,
            None => 0,
        }
    }

    /// Current `(rowid, query)` rows of the journal table at `path`.
    #[must_use]
    pub fn journal_rows(&self, path: &Path) -> Vec<(i64, String)> {
        match self.registry.read().get(path) {
            Some(db) => db
                .lock()
                .journal_rows
                .iter()
                .map(|(id, query, _)| (*id, query.clone()))
                .collect(),
            None => Vec::new(),
        }
    }
}

impl SqlConnector for MemoryConnector {
    fn connect(&self, path: &Path) -> Box<dyn SqlEngine> {
        Box::new(MemoryEngine {
            registry: Arc::clone(&self.registry),
            path: path.to_path_buf(),
            attached: RwLock::new(None),
            last_insert: Mutex::new(0),
            last_error: Mutex::new(String::new()),
        })
    }
}

/// An in-memory SQL engine connection.
///
/// Suitable for unit and integration tests. It natively understands
/// the statement shapes the sqlward core emits against its journal
/// table (`CREATE TABLE`, single-value `INSERT`, oldest-row `SELECT
/// rowid`, `DELETE ... WHERE rowid =`) and keeps real rowids for them;
/// every other statement is recorded and answered from the per-path
/// script.
///
/// # Thread safety
///
/// Connections are `Send + Sync` and may be shared across threads.
pub struct MemoryEngine {
    registry: Arc<Registry>,
    path: PathBuf,
    attached: RwLock<Option<Arc<Mutex<DbState>>>>,
    last_insert: Mutex<i64>,
    last_error: Mutex<String>,
}

impl MemoryEngine {
    fn fail(&self, message: impl Into<String>) {
        *self.last_error.lock() = message.into();
    }

    fn db(&self) -> Option<Arc<Mutex<DbState>>> {
        self.attached.read().as_ref().map(Arc::clone)
    }

    fn timestamp() -> String {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            .to_string()
    }
}

/// Extracts the single quoted value of `INSERT ... VALUES ('...')`,
/// undoing `''` escaping.
fn parse_insert_value(sql: &str) -> Option<String> {
    let start = sql.find("VALUES ('")? + "VALUES ('".len();
    let rest = &sql[start..];
    let end = rest.rfind("')")?;
    Some(rest[..end].replace("''", "'"))
}

/// Extracts the quoted rowid of `DELETE ... WHERE rowid = '...'`.
fn parse_rowid(sql: &str) -> Option<i64> {
    let start = sql.find("rowid = '")? + "rowid = '".len();
    let rest = &sql[start..];
    let end = rest.find('\'')?;
    rest[..end].parse().ok()
}

impl SqlEngine for MemoryEngine {
    fn open(&self, flags: OpenFlags) -> bool {
        if self.attached.read().is_some() {
            return true;
        }

        let existing = self.registry.read().get(&self.path).map(Arc::clone);
        let db = match existing {
            Some(db) => db,
            None if flags.create => {
                let mut registry = self.registry.write();
                Arc::clone(
                    registry
                        .entry(self.path.clone())
                        .or_insert_with(|| Arc::new(Mutex::new(DbState::new()))),
                )
            }
            None => {
                self.fail(format!("unable to open database file: {}", self.path.display()));
                return false;
            }
        };

        *self.attached.write() = Some(db);
        true
    }

    fn execute(&self, sql: &str) -> i64 {
        let Some(db) = self.db() else {
            self.fail("connection not open");
            return -1;
        };
        let mut state = db.lock();

        if let Some(affected) = state.execute_script.get(sql) {
            let affected = *affected;
            if affected < 0 {
                drop(state);
                self.fail(format!("scripted failure for: {sql}"));
            }
            return affected;
        }

        let trimmed = sql.trim_start();
        if trimmed.starts_with("CREATE TABLE") && trimmed.contains("pending_writes") {
            if state.table_created {
                drop(state);
                self.fail("table pending_writes already exists");
                return -1;
            }
            state.table_created = true;
            return 0;
        }

        if trimmed.starts_with("INSERT INTO pending_writes") {
            if !state.table_created {
                drop(state);
                self.fail("no such table: pending_writes");
                return -1;
            }
            let Some(value) = parse_insert_value(trimmed) else {
                drop(state);
                self.fail("malformed insert statement");
                return -1;
            };
            let rowid = state.next_rowid;
            state.next_rowid += 1;
            state.journal_rows.push((rowid, value, Self::timestamp()));
            drop(state);
            *self.last_insert.lock() = rowid;
            return 1;
        }

        if trimmed.starts_with("DELETE FROM pending_writes") {
            let Some(rowid) = parse_rowid(trimmed) else {
                drop(state);
                self.fail("malformed delete statement");
                return -1;
            };
            let before = state.journal_rows.len();
            state.journal_rows.retain(|(id, _, _)| *id != rowid);
            return (before - state.journal_rows.len()) as i64;
        }

        state.applied.push(sql.to_string());
        1
    }

    fn execute_select(&self, sql: &str) -> Option<Box<dyn ResultCursor + '_>> {
        let Some(db) = self.db() else {
            self.fail("connection not open");
            return None;
        };
        let mut state = db.lock();

        if let Some(queue) = state.select_script.get_mut(sql) {
            let rows = if queue.len() > 1 {
                queue.pop_front().unwrap_or_default()
            } else {
                queue.front().cloned().unwrap_or_default()
            };
            return Some(Box::new(MemoryCursor::new(rows)));
        }

        if sql.starts_with("SELECT rowid") && sql.contains("pending_writes") {
            if !state.table_created {
                drop(state);
                self.fail("no such table: pending_writes");
                return None;
            }
            let rows: Rows = state
                .journal_rows
                .iter()
                .min_by_key(|(id, _, _)| *id)
                .map(|(id, query, ts)| {
                    vec![vec![
                        Some(id.to_string()),
                        Some(query.clone()),
                        Some(ts.clone()),
                    ]]
                })
                .unwrap_or_default();
            return Some(Box::new(MemoryCursor::new(rows)));
        }

        drop(state);
        self.fail(format!("unrecognized select: {sql}"));
        None
    }

    fn backup_to(&self, path: &Path, on_progress: &mut dyn FnMut(i64, i64)) -> bool {
        let Some(db) = self.db() else {
            self.fail("connection not open");
            return false;
        };
        let (steps, ok, snapshot) = {
            let mut state = db.lock();
            state.backup_calls += 1;
            (state.backup_steps.clone(), state.backup_ok, state.clone())
        };

        for (remaining, total) in steps {
            on_progress(remaining, total);
        }

        if !ok {
            self.fail("backup primitive failed");
            return false;
        }

        self.registry
            .write()
            .insert(path.to_path_buf(), Arc::new(Mutex::new(snapshot)));
        true
    }

    fn integrity_check(&self) -> bool {
        match self.db() {
            Some(db) => db.lock().integrity_ok,
            None => {
                self.fail("connection not open");
                false
            }
        }
    }

    fn last_insert_id(&self) -> i64 {
        *self.last_insert.lock()
    }

    fn last_error(&self) -> String {
        self.last_error.lock().clone()
    }
}

/// Cursor over an owned result set.
struct MemoryCursor {
    rows: Rows,
    pos: Option<usize>,
}

impl MemoryCursor {
    fn new(rows: Rows) -> Self {
        Self { rows, pos: None }
    }

    fn current(&self) -> Option<&Vec<Option<String>>> {
        self.pos.and_then(|p| self.rows.get(p))
    }
}

impl ResultCursor for MemoryCursor {
    fn advance(&mut self) -> bool {
        let next = self.pos.map_or(0, |p| p + 1);
        if next < self.rows.len() {
            self.pos = Some(next);
            true
        } else {
            self.pos = Some(self.rows.len());
            false
        }
    }

    fn column_text(&self, i: usize) -> Option<String> {
        self.current().and_then(|row| row.get(i).cloned().flatten())
    }

    fn column_count(&self) -> usize {
        self.current().map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::OpenFlags;

    fn open_db(connector: &MemoryConnector, path: &str) -> Box<dyn SqlEngine> {
        let engine = connector.connect(Path::new(path));
        assert!(engine.open(OpenFlags::READ_WRITE_CREATE));
        engine
    }

    #[test]
    fn open_missing_without_create_fails() {
        let connector = MemoryConnector::new();
        let engine = connector.connect(Path::new("absent.db"));

        assert!(!engine.open(OpenFlags::READ_WRITE));
        assert!(engine.last_error().contains("absent.db"));
    }

    #[test]
    fn open_with_create_then_reopen_read_write() {
        let connector = MemoryConnector::new();
        let first = connector.connect(Path::new("a.db"));
        assert!(first.open(OpenFlags::READ_WRITE_CREATE));

        let second = connector.connect(Path::new("a.db"));
        assert!(second.open(OpenFlags::READ_WRITE));
    }

    #[test]
    fn create_table_twice_fails() {
        let connector = MemoryConnector::new();
        let engine = open_db(&connector, "j.db");

        assert_eq!(engine.execute("CREATE TABLE pending_writes(query TEXT)"), 0);
        assert!(engine.execute("CREATE TABLE pending_writes(query TEXT)") < 0);
        assert!(engine.last_error().contains("already exists"));
    }

    #[test]
    fn insert_assigns_increasing_rowids() {
        let connector = MemoryConnector::new();
        let engine = open_db(&connector, "j.db");
        engine.execute("CREATE TABLE pending_writes(query TEXT)");

        engine.execute("INSERT INTO pending_writes (query) VALUES ('one');");
        assert_eq!(engine.last_insert_id(), 1);
        engine.execute("INSERT INTO pending_writes (query) VALUES ('two');");
        assert_eq!(engine.last_insert_id(), 2);

        let rows = connector.journal_rows(Path::new("j.db"));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], (1, "one".to_string()));
    }

    #[test]
    fn insert_unescapes_quotes() {
        let connector = MemoryConnector::new();
        let engine = open_db(&connector, "j.db");
        engine.execute("CREATE TABLE pending_writes(query TEXT)");
        engine.execute("INSERT INTO pending_writes (query) VALUES ('it''s');");

        let rows = connector.journal_rows(Path::new("j.db"));
        assert_eq!(rows[0].1, "it's");
    }

    #[test]
    fn select_oldest_returns_lowest_rowid() {
        let connector = MemoryConnector::new();
        let engine = open_db(&connector, "j.db");
        engine.execute("CREATE TABLE pending_writes(query TEXT)");
        engine.execute("INSERT INTO pending_writes (query) VALUES ('first');");
        engine.execute("INSERT INTO pending_writes (query) VALUES ('second');");

        let mut cursor = engine
            .execute_select(
                "SELECT rowid, query, timestamp FROM pending_writes ORDER BY rowid ASC LIMIT 1;",
            )
            .unwrap();
        assert!(cursor.advance());
        assert_eq!(cursor.column_text(0).unwrap(), "1");
        assert_eq!(cursor.column_text(1).unwrap(), "first");
        assert_eq!(cursor.column_count(), 3);
        assert!(!cursor.advance());
    }

    #[test]
    fn delete_by_rowid_removes_row() {
        let connector = MemoryConnector::new();
        let engine = open_db(&connector, "j.db");
        engine.execute("CREATE TABLE pending_writes(query TEXT)");
        engine.execute("INSERT INTO pending_writes (query) VALUES ('x');");

        assert_eq!(engine.execute("DELETE FROM pending_writes WHERE rowid = '1';"), 1);
        assert!(connector.journal_rows(Path::new("j.db")).is_empty());

        // Deleting an absent row affects nothing.
        assert_eq!(engine.execute("DELETE FROM pending_writes WHERE rowid = '1';"), 0);
    }

    #[test]
    fn generic_statements_are_recorded() {
        let connector = MemoryConnector::new();
        let engine = open_db(&connector, "main.db");

        assert_eq!(engine.execute("INSERT INTO t VALUES (1)"), 1);
        assert_eq!(
            connector.applied(Path::new("main.db")),
            vec!["INSERT INTO t VALUES (1)".to_string()]
        );
    }

    #[test]
    fn scripted_execute_overrides_native_handling() {
        let connector = MemoryConnector::new();
        connector.script_execute(Path::new("main.db"), "UPDATE Config SET n = 1", -1);
        let engine = open_db(&connector, "main.db");

        assert_eq!(engine.execute("UPDATE Config SET n = 1"), -1);
        assert!(engine.last_error().contains("scripted failure"));
    }

    #[test]
    fn scripted_selects_consume_in_order_and_last_is_sticky() {
        let connector = MemoryConnector::new();
        let path = Path::new("main.db");
        connector.script_select(path, "SELECT n", vec![vec![Some("5".into())]]);
        connector.script_select(path, "SELECT n", vec![vec![Some("4".into())]]);
        let engine = open_db(&connector, "main.db");

        for expected in ["5", "4", "4"] {
            let mut cursor = engine.execute_select("SELECT n").unwrap();
            assert!(cursor.advance());
            assert_eq!(cursor.column_text(0).unwrap(), expected);
        }
    }

    #[test]
    fn unscripted_select_fails() {
        let connector = MemoryConnector::new();
        let engine = open_db(&connector, "main.db");

        assert!(engine.execute_select("SELECT mystery FROM nowhere").is_none());
        assert!(!engine.last_error().is_empty());
    }

    #[test]
    fn backup_reports_progress_and_copies_state() {
        let connector = MemoryConnector::new();
        let source = Path::new("main.db");
        connector.script_backup(source, vec![(3, 4), (0, 4)], true);
        let engine = open_db(&connector, "main.db");
        engine.execute("CREATE TABLE pending_writes(query TEXT)");

        let mut seen = Vec::new();
        let ok = engine.backup_to(Path::new("backup.db"), &mut |remaining, total| {
            seen.push((remaining, total));
        });

        assert!(ok);
        assert_eq!(seen, vec![(3, 4), (0, 4)]);
        assert!(connector.db_exists(Path::new("backup.db")));
    }

    #[test]
    fn failed_backup_sets_error() {
        let connector = MemoryConnector::new();
        connector.script_backup(Path::new("main.db"), vec![(1, 2)], false);
        let engine = open_db(&connector, "main.db");

        assert!(!engine.backup_to(Path::new("backup.db"), &mut |_, _| {}));
        assert!(engine.last_error().contains("backup"));
    }

    #[test]
    fn integrity_verdict_is_scriptable() {
        let connector = MemoryConnector::new();
        let engine = open_db(&connector, "main.db");
        assert!(engine.integrity_check());

        connector.script_integrity(Path::new("main.db"), false);
        assert!(!engine.integrity_check());
    }
}
