//! Lazily-loaded cached scalar backed by the primary database.

use crate::error::{CoreError, CoreResult};
use parking_lot::RwLock;
use sqlward_engine::SqlEngine;
use tracing::warn;

/// A cached scalar value (e.g. a remaining-capacity figure) derived
/// from a query against the primary database.
///
/// Every session reads this on hot paths, so reads take a shared lock
/// and return a snapshot; the cache is only rewritten by the first
/// load and by [`ConfigCache::update_then_refresh`].
///
/// The loaded value must be either the literal `"0"` or a strictly
/// positive integer - the domain allows "none left" and otherwise
/// requires a valid positive count.
#[derive(Debug, Default)]
pub struct ConfigCache {
    value: RwLock<Option<String>>,
}

impl ConfigCache {
    /// Creates an uninitialized cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the cache from `select_sql` if it is still uninitialized.
    ///
    /// A second call while already loaded is a no-op and does not
    /// touch the database.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Query`] if the select fails, returns an
    /// empty result, or returns a value that is neither `"0"` nor a
    /// strictly positive integer.
    pub fn ensure_loaded(&self, engine: &dyn SqlEngine, select_sql: &str) -> CoreResult<()> {
        if self.value.read().is_some() {
            return Ok(());
        }
        self.load(engine, select_sql)
    }

    /// Returns the last cached value without touching the database.
    ///
    /// `None` means the cache was never loaded. Concurrent readers do
    /// not block each other.
    #[must_use]
    pub fn get(&self) -> Option<String> {
        self.value.read().clone()
    }

    /// Executes `update_sql`, then re-derives the cached value from
    /// `select_sql`.
    ///
    /// This is the only path that refreshes an already-loaded cache.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Query`] if the update reports a negative
    /// affected-row count (carrying the engine's error text) or if the
    /// reload fails validation.
    pub fn update_then_refresh(
        &self,
        engine: &dyn SqlEngine,
        update_sql: &str,
        select_sql: &str,
    ) -> CoreResult<()> {
        let affected = engine.execute(update_sql);
        if affected < 0 {
            let message = format!("update affected {} rows: {}", affected, engine.last_error());
            warn!(%message, "config update failed");
            return Err(CoreError::query(message));
        }

        self.load(engine, select_sql)
    }

    fn load(&self, engine: &dyn SqlEngine, select_sql: &str) -> CoreResult<()> {
        let Some(mut cursor) = engine.execute_select(select_sql) else {
            let message = format!("config select failed: {}", engine.last_error());
            warn!(%message);
            return Err(CoreError::query(message));
        };

        // The query is expected to yield one column of one row; be
        // tolerant and concatenate whatever comes back, with a marker
        // for null cells.
        let mut result = String::new();
        while cursor.advance() {
            for i in 0..cursor.column_count() {
                match cursor.column_text(i) {
                    Some(text) => result.push_str(&text),
                    None => result.push_str("NONE"),
                }
            }
        }
        drop(cursor);

        if result.is_empty() {
            warn!("config select returned empty result");
            return Err(CoreError::query("config select returned empty result"));
        }

        if result != "0" {
            match result.parse::<u64>() {
                Ok(n) if n > 0 => {}
                _ => {
                    let message = format!("cannot convert '{result}' to a positive count");
                    warn!(%message);
                    return Err(CoreError::query(message));
                }
            }
        }

        *self.value.write() = Some(result);
        Ok(())
    }
}
