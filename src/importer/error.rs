// ==========================================
// Precast tracking backend - importer error types
// ==========================================
// Tool: thiserror derive
// ==========================================

use crate::db::PoolError;
use crate::domain::RefCategory;
use thiserror::Error;

/// Importer error type
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== File errors =====
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("unsupported file format: {0} (expected .csv/.xlsx/.xlsm/.xls/.ods)")]
    UnsupportedFormat(String),

    #[error("file read failed: {0}")]
    FileReadError(String),

    #[error("spreadsheet parse failed: {0}")]
    ExcelParseError(String),

    #[error("CSV parse failed: {0}")]
    CsvParseError(String),

    #[error("file has no header row")]
    MissingHeader,

    // ===== Row errors =====
    #[error("invalid row {row}: {message}")]
    InvalidRow { row: usize, message: String },

    #[error("{category} reference not found: '{label}'")]
    ReferenceNotFound { category: RefCategory, label: String },

    // ===== Database errors =====
    #[error("database error: {0}")]
    Database(String),

    #[error("fatal database error: {0}")]
    FatalDatabase(String),

    #[error("connection pool exhausted: {0}")]
    PoolExhausted(String),

    // ===== Job control =====
    #[error("import cancelled")]
    Cancelled,

    // ===== Generic =====
    #[error("internal error: {0}")]
    InternalError(String),
}

impl ImportError {
    /// Errors that stop the whole pipeline rather than a single row.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ImportError::FileNotFound(_)
                | ImportError::UnsupportedFormat(_)
                | ImportError::FileReadError(_)
                | ImportError::ExcelParseError(_)
                | ImportError::CsvParseError(_)
                | ImportError::MissingHeader
                | ImportError::FatalDatabase(_)
                | ImportError::PoolExhausted(_)
        )
    }
}

impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

impl From<rusqlite::Error> for ImportError {
    fn from(err: rusqlite::Error) -> Self {
        if is_connection_failure(&err) {
            ImportError::FatalDatabase(err.to_string())
        } else {
            ImportError::Database(err.to_string())
        }
    }
}

impl From<PoolError> for ImportError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Open(e) => ImportError::FatalDatabase(e.to_string()),
            other => ImportError::PoolExhausted(other.to_string()),
        }
    }
}

impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

/// Failures that mean the database itself is unusable, as opposed to a
/// statement failing for one row.
pub fn is_connection_failure(err: &rusqlite::Error) -> bool {
    use rusqlite::ErrorCode;
    match err {
        rusqlite::Error::SqliteFailure(e, _) => matches!(
            e.code,
            ErrorCode::CannotOpen
                | ErrorCode::NotADatabase
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::SystemIoFailure
                | ErrorCode::OutOfMemory
                | ErrorCode::DiskFull
        ),
        _ => false,
    }
}

/// Result alias
pub type ImportResult<T> = Result<T, ImportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(ImportError::MissingHeader.is_fatal());
        assert!(ImportError::PoolExhausted("x".into()).is_fatal());
        assert!(!ImportError::InvalidRow {
            row: 1,
            message: "bad".into()
        }
        .is_fatal());
        assert!(!ImportError::Database("constraint".into()).is_fatal());
    }

    #[test]
    fn test_sqlite_constraint_is_not_connection_failure() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER UNIQUE); INSERT INTO t VALUES (1);")
            .unwrap();
        let err = conn.execute("INSERT INTO t VALUES (1)", []).unwrap_err();
        assert!(!is_connection_failure(&err));
        assert!(matches!(ImportError::from(err), ImportError::Database(_)));
    }
}
