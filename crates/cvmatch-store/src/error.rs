use thiserror::Error;

use crate::session::SessionState;

/// User-facing message for a rejected import.
pub const INVALID_IMPORT_MESSAGE: &str = "The selected file is not a valid database file. \
     Please import a file that was previously exported from this application.";

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The SQLite engine could not be loaded or lacks a required feature.
    #[error("Database unavailable: engine failed to load: {0}")]
    EngineUnavailable(String),

    /// Durable storage is inaccessible (permissions, quota, missing mount).
    #[error("Database unavailable: blob store is inaccessible: {0}")]
    BlobStoreUnavailable(String),

    /// The image kept in the blob store no longer opens.
    #[error("Database unavailable: stored image is corrupt: {0}")]
    CorruptStoredImage(String),

    /// Rejected import; the active database is left untouched.
    #[error("{} ({0})", INVALID_IMPORT_MESSAGE)]
    InvalidImport(String),

    /// A foreign-key, NOT NULL or similar constraint rejected a write.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// The session has no active database yet.
    #[error("Database is not ready (state: {0})")]
    NotReady(SessionState),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON column failed to encode or decode.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Chrono parsing error.
    #[error("Timestamp parse error: {0}")]
    ChronoParse(#[from] chrono::ParseError),
}

/// Coarse classification callers use to decide how to react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Setup failed; nothing else will work in this session.
    Fatal,
    /// The import was rejected; the previous database is still active.
    InvalidImport,
    /// A single operation failed; the session remains usable.
    Operation,
}

impl StoreError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            StoreError::EngineUnavailable(_)
            | StoreError::BlobStoreUnavailable(_)
            | StoreError::CorruptStoredImage(_) => ErrorCategory::Fatal,
            StoreError::InvalidImport(_) => ErrorCategory::InvalidImport,
            _ => ErrorCategory::Operation,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.category() == ErrorCategory::Fatal
    }

    // Used on every write so constraint failures surface as their own kind.
    pub(crate) fn from_write(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref code, ref msg)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::ConstraintViolation(
                    msg.clone().unwrap_or_else(|| code.to_string()),
                )
            }
            other => StoreError::Sqlite(other),
        }
    }

    pub(crate) fn not_found_or(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
            other => StoreError::Sqlite(other),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert!(StoreError::EngineUnavailable("wasm".into()).is_fatal());
        assert!(StoreError::BlobStoreUnavailable("denied".into()).is_fatal());
        assert!(StoreError::CorruptStoredImage("bad".into()).is_fatal());
        assert_eq!(
            StoreError::InvalidImport("bad".into()).category(),
            ErrorCategory::InvalidImport
        );
        assert_eq!(StoreError::NotFound.category(), ErrorCategory::Operation);
        assert!(!StoreError::ConstraintViolation("fk".into()).is_fatal());
    }

    #[test]
    fn test_invalid_import_message() {
        let msg = StoreError::InvalidImport("file is not a database".into()).to_string();
        assert!(msg.starts_with("The selected file is not a valid database file."));
        assert!(msg.contains("file is not a database"));
    }

    #[test]
    fn test_fatal_errors_read_as_unavailable() {
        let msg = StoreError::BlobStoreUnavailable("permission denied".into()).to_string();
        assert!(msg.starts_with("Database unavailable"));
    }
}
