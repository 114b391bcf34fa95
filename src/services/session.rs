// ==========================================
// Precast tracking backend - session validation
// ==========================================
// Every import call carries `Authorization: Bearer <session_id>`
// (a bare session id is accepted too). Validation is delegated to a
// SessionValidator; the default one reads the `session` table.
// ==========================================

use crate::domain::CallerContext;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing session token")]
    MissingToken,

    #[error("invalid session")]
    InvalidSession,

    #[error("session expired")]
    Expired,

    #[error("session lookup failed: {0}")]
    Backend(String),
}

#[async_trait]
pub trait SessionValidator: Send + Sync {
    async fn validate(&self, token: &str) -> Result<CallerContext, AuthError>;
}

/// Token from an Authorization header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let header = header.trim();
    let token = match header.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        None if header.eq_ignore_ascii_case("bearer") => "",
        _ => header,
    };
    (!token.is_empty()).then_some(token)
}

// ==========================================
// SqliteSessionValidator
// ==========================================
pub struct SqliteSessionValidator {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSessionValidator {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lookup(&self, token: &str) -> Result<CallerContext, AuthError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| AuthError::Backend(e.to_string()))?;

        let row: Option<(i64, Option<String>, Option<String>, Option<DateTime<Utc>>)> = conn
            .query_row(
                "SELECT user_id, host_name, ip_address, expires_at FROM session WHERE session_id = ?1",
                params![token],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
            .map_err(|e| AuthError::Backend(e.to_string()))?;

        let (user_id, host, ip, expires_at) = row.ok_or(AuthError::InvalidSession)?;
        if matches!(expires_at, Some(at) if at <= Utc::now()) {
            return Err(AuthError::Expired);
        }
        Ok(CallerContext { user_id, host, ip })
    }
}

#[async_trait]
impl SessionValidator for SqliteSessionValidator {
    async fn validate(&self, token: &str) -> Result<CallerContext, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        self.lookup(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn validator() -> SqliteSessionValidator {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE session (session_id TEXT PRIMARY KEY, user_id INTEGER NOT NULL,
                host_name TEXT, ip_address TEXT, expires_at TEXT);",
        )
        .unwrap();
        conn.execute(
            "INSERT INTO session VALUES ('good', 5, 'ws-01', '10.0.0.5', ?1)",
            params![Utc::now() + Duration::hours(1)],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO session VALUES ('old', 6, NULL, NULL, ?1)",
            params![Utc::now() - Duration::hours(1)],
        )
        .unwrap();
        SqliteSessionValidator::new(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer   abc "), Some("abc"));
        assert_eq!(bearer_token("abc"), Some("abc"));
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token(""), None);
    }

    #[tokio::test]
    async fn test_validate_sessions() {
        let v = validator();

        let caller = v.validate("good").await.unwrap();
        assert_eq!(caller.user_id, 5);
        assert_eq!(caller.host.as_deref(), Some("ws-01"));

        assert_eq!(v.validate("old").await.unwrap_err(), AuthError::Expired);
        assert_eq!(v.validate("nope").await.unwrap_err(), AuthError::InvalidSession);
        assert_eq!(v.validate("").await.unwrap_err(), AuthError::MissingToken);
    }
}
