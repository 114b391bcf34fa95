// ==========================================
// Precast tracking backend - API error type
// ==========================================
// Four caller-facing classes; lower layer errors are folded into them.
// HTTP status mapping lives in crate::server.
// ==========================================

use crate::importer::ImportError;
use crate::jobs::JobError;
use crate::repository::error::RepositoryError;
use crate::services::{AuthError, StorageError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Machine-readable code in error responses.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Unauthenticated(_) => "unauthenticated",
            ApiError::NotFound(_) => "not_found",
            ApiError::Internal(_) => "internal",
        }
    }
}

// ==========================================
// Conversions
// ==========================================

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{} {} not found", entity, id))
            }
            RepositoryError::FieldValueError { field, message } => {
                ApiError::BadRequest(format!("invalid {}: {}", field, message))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::NotFound(id) => ApiError::NotFound(format!("import job {} not found", id)),
            JobError::InvalidRequest(msg) => ApiError::BadRequest(msg),
            JobError::Timeout(id) => ApiError::Internal(format!("timed out waiting for job {}", id)),
            JobError::Repository(e) => ApiError::from(e),
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::UnsupportedFormat(_) | ImportError::InvalidRow { .. } => {
                ApiError::BadRequest(err.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Backend(msg) => ApiError::Internal(format!("session lookup failed: {}", msg)),
            other => ApiError::Unauthenticated(other.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err: ApiError = JobError::NotFound("j1".into()).into();
        assert_eq!(err.code(), "not_found");
        assert!(err.to_string().contains("j1"));

        let err: ApiError = ImportError::UnsupportedFormat("a.txt".into()).into();
        assert_eq!(err.code(), "bad_request");

        let err: ApiError = AuthError::Expired.into();
        assert_eq!(err.code(), "unauthenticated");

        let err: ApiError = AuthError::Backend("locked".into()).into();
        assert_eq!(err.code(), "internal");
    }

    #[test]
    fn test_repository_error_conversion() {
        let err: ApiError = RepositoryError::NotFound {
            entity: "ImportJob".to_string(),
            id: "j9".to_string(),
        }
        .into();
        match err {
            ApiError::NotFound(msg) => assert!(msg.contains("j9")),
            other => panic!("unexpected {:?}", other),
        }

        let err: ApiError = RepositoryError::LockError("poisoned".into()).into();
        assert_eq!(err.code(), "internal");
    }
}
