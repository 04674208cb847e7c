//! Error types for the sqlward core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A query against the primary database failed or produced data
    /// the core cannot accept (empty or non-numeric config reads).
    #[error("query error: {message}")]
    Query {
        /// Description of the failure.
        message: String,
    },

    /// The journal store could not be opened, created or written.
    #[error("journal storage error: {message}")]
    Storage {
        /// Description of the failure.
        message: String,
    },

    /// Post-backup integrity verification failed.
    #[error("integrity check failed: {message}")]
    Integrity {
        /// Description of the failure.
        message: String,
    },

    /// The engine's online-backup primitive failed.
    #[error("backup engine error: {message}")]
    BackupEngine {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates a query error.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    /// Creates a journal storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates an integrity error.
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }

    /// Creates a backup engine error.
    pub fn backup_engine(message: impl Into<String>) -> Self {
        Self::BackupEngine {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_message() {
        let err = CoreError::query("no rows returned");
        assert_eq!(err.to_string(), "query error: no rows returned");

        let err = CoreError::storage("cannot open journal");
        assert!(err.to_string().contains("cannot open journal"));
    }

    #[test]
    fn variants_are_distinguishable() {
        assert!(matches!(CoreError::integrity("x"), CoreError::Integrity { .. }));
        assert!(matches!(
            CoreError::backup_engine("x"),
            CoreError::BackupEngine { .. }
        ));
    }
}
