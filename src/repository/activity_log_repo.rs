// ==========================================
// Precast tracking backend - activity log repository
// ==========================================
// Table: activity_logs (created idempotently)
// Written only by the ActivityLogger drain task.
// ==========================================

use crate::domain::{ActivityAction, ActivityLog};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::sync::{Arc, Mutex};

pub struct ActivityLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ActivityLogRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn ensure_table(&self) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS activity_logs (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              project_id INTEGER,
              actor INTEGER NOT NULL,
              host TEXT,
              ip TEXT,
              action TEXT NOT NULL,
              detail_json TEXT,
              created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_activity_logs_project
              ON activity_logs(project_id, created_at DESC);
            "#,
        )?;
        Ok(())
    }

    /// Insert one entry; returns its row id.
    pub fn insert(&self, log: &ActivityLog) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO activity_logs (project_id, actor, host, ip, action, detail_json, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                log.project_id,
                log.actor,
                log.host,
                log.ip,
                log.action.as_str(),
                log.detail_json.as_ref().map(|v| v.to_string()),
                log.created_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Entries for a project, newest first.
    pub fn list_by_project(&self, project_id: i64, limit: usize) -> RepositoryResult<Vec<ActivityLog>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT project_id, actor, host, ip, action, detail_json, created_at
              FROM activity_logs
             WHERE project_id = ?1
             ORDER BY id DESC
             LIMIT ?2
            "#,
        )?;
        let rows = stmt.query_map(params![project_id, limit as i64], map_row)?;

        let mut logs = Vec::new();
        for row in rows {
            logs.push(row?);
        }
        Ok(logs)
    }
}

fn map_row(row: &Row) -> rusqlite::Result<ActivityLog> {
    let action: String = row.get(4)?;
    let detail: Option<String> = row.get(5)?;
    let created_at: DateTime<Utc> = row.get(6)?;

    Ok(ActivityLog {
        project_id: row.get(0)?,
        actor: row.get(1)?,
        host: row.get(2)?,
        ip: row.get(3)?,
        action: ActivityAction::from_str_opt(&action).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Text,
                format!("unknown activity action: {}", action).into(),
            )
        })?,
        detail_json: detail.and_then(|d| serde_json::from_str(&d).ok()),
        created_at,
    })
}
