//! Error types for contratos-core

use thiserror::Error;

use crate::models::SyncConflict;
use crate::remote::RemoteError;

/// Result type alias using contratos-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in contratos-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// `SQLite` error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote store failure (after retries, when the error was transient)
    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),

    /// The remote database changed after this context last observed it
    #[error("{0}")]
    Conflict(SyncConflict),

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Record already exists under the same natural key
    #[error("Already exists: {0}")]
    Duplicate(String),

    /// Delete refused because other rows still reference the record
    #[error("Cannot delete {entity} {key}: still referenced by {dependents}")]
    HasDependents {
        entity: &'static str,
        key: String,
        dependents: String,
    },
}

/// Coarse classification callers branch on instead of matching messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network/timeout/5xx-class remote failure; a later attempt may succeed.
    Transient,
    /// Remote copy moved on; needs an explicit re-sync.
    Conflict,
    /// Local data rule violated (uniqueness, references, bad input).
    Integrity,
    /// Startup configuration is missing or malformed.
    Configuration,
    /// Anything else.
    Fatal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Remote(remote) if remote.is_transient() => ErrorKind::Transient,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Config(_) => ErrorKind::Configuration,
            Self::Database(error) if is_constraint_violation(error) => ErrorKind::Integrity,
            Self::NotFound(_)
            | Self::InvalidInput(_)
            | Self::Duplicate(_)
            | Self::HasDependents { .. } => ErrorKind::Integrity,
            _ => ErrorKind::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Map a `SQLite` unique or primary-key failure to `Duplicate`, leaving other errors intact.
    pub(crate) fn duplicate_on_conflict(error: rusqlite::Error, what: impl Into<String>) -> Self {
        if is_key_collision(&error) {
            Self::Duplicate(what.into())
        } else {
            Self::Database(error)
        }
    }
}

fn is_key_collision(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

fn is_constraint_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_transient_errors_are_retryable() {
        let error = Error::Remote(RemoteError::Transient("timed out".to_string()));
        assert_eq!(error.kind(), ErrorKind::Transient);
        assert!(error.is_retryable());

        let error = Error::Remote(RemoteError::NotFound("file".to_string()));
        assert_eq!(error.kind(), ErrorKind::Fatal);
        assert!(!error.is_retryable());
    }

    #[test]
    fn constraint_violations_are_integrity_errors() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (k TEXT UNIQUE); INSERT INTO t VALUES ('a');")
            .unwrap();
        let error: Error = conn
            .execute("INSERT INTO t VALUES ('a')", [])
            .unwrap_err()
            .into();
        assert_eq!(error.kind(), ErrorKind::Integrity);
    }

    #[test]
    fn only_key_collisions_become_duplicates() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, k TEXT UNIQUE, v TEXT NOT NULL);
             INSERT INTO t VALUES (1, 'a', 'x');",
        )
        .unwrap();

        let unique = conn
            .execute("INSERT INTO t VALUES (2, 'a', 'y')", [])
            .unwrap_err();
        assert!(matches!(
            Error::duplicate_on_conflict(unique, "k a"),
            Error::Duplicate(what) if what == "k a"
        ));

        let primary = conn
            .execute("INSERT INTO t VALUES (1, 'b', 'y')", [])
            .unwrap_err();
        assert!(matches!(
            Error::duplicate_on_conflict(primary, "id 1"),
            Error::Duplicate(_)
        ));

        let not_null = conn
            .execute("INSERT INTO t VALUES (3, 'c', NULL)", [])
            .unwrap_err();
        let error = Error::duplicate_on_conflict(not_null, "k c");
        assert!(matches!(error, Error::Database(_)));
        assert_eq!(error.kind(), ErrorKind::Integrity);
    }

    #[test]
    fn config_errors_are_not_retryable() {
        let error = Error::Config("GDRIVE_DATABASE_FOLDER_ID is not set".to_string());
        assert_eq!(error.kind(), ErrorKind::Configuration);
        assert!(!error.is_retryable());
    }
}
