// ==========================================
// Precast tracking backend - repository error types
// ==========================================
// Tool: thiserror derive
// ==========================================

use thiserror::Error;

/// Repository error type
#[derive(Error, Debug)]
pub enum RepositoryError {
    // ===== Database errors =====
    #[error("record not found: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    #[error("database lock acquisition failed: {0}")]
    LockError(String),

    #[error("database query failed: {0}")]
    DatabaseQueryError(String),

    #[error("unique constraint violated: {0}")]
    UniqueConstraintViolation(String),

    #[error("foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),

    // ===== State errors =====
    #[error("invalid state transition: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    // ===== Data errors =====
    #[error("stored value could not be decoded (field={field}): {message}")]
    FieldValueError { field: String, message: String },

    #[error("serialization failed: {0}")]
    SerializationError(String),
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(_, Some(msg)) => {
                if msg.contains("UNIQUE") {
                    RepositoryError::UniqueConstraintViolation(msg)
                } else if msg.contains("FOREIGN KEY") {
                    RepositoryError::ForeignKeyViolation(msg)
                } else {
                    RepositoryError::DatabaseQueryError(msg)
                }
            }
            rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound {
                entity: "Unknown".to_string(),
                id: "Unknown".to_string(),
            },
            _ => RepositoryError::DatabaseQueryError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::SerializationError(err.to_string())
    }
}

/// Result alias
pub type RepositoryResult<T> = Result<T, RepositoryError>;
