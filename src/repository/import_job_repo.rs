// ==========================================
// Precast tracking backend - import job repository
// ==========================================
// Table: import_jobs (created idempotently, owned by this crate)
// State changes are guarded in SQL so that a terminal job never moves:
//   claim:   pending → running
//   finish:  pending|running → succeeded|failed|cancelled
// ==========================================

use crate::domain::{ErrorSummary, ImportJob, JobCounters, JobState};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    id, project_id, state, total, processed, succeeded, failed,
    batch_size, concurrent_batches, file_path, error_summary_json,
    created_by, created_at, started_at, finished_at
"#;

pub struct ImportJobRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ImportJobRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        let repo = Self { conn };
        // best-effort here; callers that need the table call ensure_table themselves
        if let Err(e) = repo.ensure_table() {
            tracing::warn!("import_jobs ensure failed: {}", e);
        }
        repo
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
            CREATE TABLE IF NOT EXISTS import_jobs (
              id TEXT PRIMARY KEY,
              project_id INTEGER NOT NULL,
              state TEXT NOT NULL DEFAULT 'pending',
              total INTEGER NOT NULL DEFAULT 0,
              processed INTEGER NOT NULL DEFAULT 0,
              succeeded INTEGER NOT NULL DEFAULT 0,
              failed INTEGER NOT NULL DEFAULT 0,
              batch_size INTEGER NOT NULL,
              concurrent_batches INTEGER NOT NULL,
              file_path TEXT NOT NULL,
              error_summary_json TEXT,
              created_by INTEGER,
              created_at TEXT NOT NULL,
              started_at TEXT,
              finished_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_import_jobs_project
              ON import_jobs(project_id, created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_import_jobs_state
              ON import_jobs(state);
            "#,
        )?;
        Ok(())
    }

    // ==========================================
    // Writes
    // ==========================================

    pub fn insert(&self, job: &ImportJob) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO import_jobs (
              id, project_id, state, total, processed, succeeded, failed,
              batch_size, concurrent_batches, file_path, error_summary_json,
              created_by, created_at, started_at, finished_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
            params![
                job.job_id,
                job.project_id,
                job.state.as_str(),
                job.total,
                job.processed,
                job.succeeded,
                job.failed,
                job.batch_size,
                job.concurrent_batches,
                job.file_path,
                serde_json::to_string(&job.error_summary)?,
                job.created_by,
                job.created_at,
                job.started_at,
                job.finished_at,
            ],
        )?;
        Ok(())
    }

    /// pending → running. Returns false when the job was not pending.
    pub fn claim(&self, job_id: &str, started_at: DateTime<Utc>) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "UPDATE import_jobs SET state = 'running', started_at = ?1 WHERE id = ?2 AND state = 'pending'",
            params![started_at, job_id],
        )?;
        Ok(rows == 1)
    }

    /// Persist counters and the error summary of a running job.
    pub fn update_progress(
        &self,
        job_id: &str,
        counters: JobCounters,
        summary: &ErrorSummary,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            UPDATE import_jobs
               SET total = ?1, processed = ?2, succeeded = ?3, failed = ?4,
                   error_summary_json = ?5
             WHERE id = ?6 AND state = 'running'
            "#,
            params![
                counters.total,
                counters.processed,
                counters.succeeded,
                counters.failed,
                serde_json::to_string(summary)?,
                job_id,
            ],
        )?;
        Ok(())
    }

    /// Move a non-terminal job into a terminal state.
    ///
    /// # Returns
    /// - Ok(true): state written
    /// - Ok(false): job missing or already terminal
    /// - Err(InvalidStateTransition): `state` is not terminal
    pub fn finish(
        &self,
        job_id: &str,
        state: JobState,
        counters: JobCounters,
        summary: &ErrorSummary,
        finished_at: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        if !state.is_terminal() {
            return Err(RepositoryError::InvalidStateTransition {
                from: "running".to_string(),
                to: state.to_string(),
            });
        }

        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"
            UPDATE import_jobs
               SET state = ?1, total = ?2, processed = ?3, succeeded = ?4, failed = ?5,
                   error_summary_json = ?6, finished_at = ?7
             WHERE id = ?8 AND state IN ('pending', 'running')
            "#,
            params![
                state.as_str(),
                counters.total,
                counters.processed,
                counters.succeeded,
                counters.failed,
                serde_json::to_string(summary)?,
                finished_at,
                job_id,
            ],
        )?;
        Ok(rows == 1)
    }

    /// Fail every job a previous process left pending or running.
    pub fn fail_interrupted(&self, reason: &str) -> RepositoryResult<usize> {
        let summary = ErrorSummary {
            reason: Some(reason.to_string()),
            ..Default::default()
        };
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"
            UPDATE import_jobs
               SET state = 'failed', finished_at = ?1,
                   error_summary_json = ?2
             WHERE state IN ('pending', 'running')
            "#,
            params![Utc::now(), serde_json::to_string(&summary)?],
        )?;
        Ok(rows)
    }

    // ==========================================
    // Reads
    // ==========================================

    pub fn find_by_id(&self, job_id: &str) -> RepositoryResult<Option<ImportJob>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM import_jobs WHERE id = ?1", SELECT_COLUMNS);
        let job = conn
            .query_row(&sql, params![job_id], map_job_row)
            .optional()?;
        job.transpose()
    }

    /// Most recent jobs of a project, newest first.
    pub fn list_recent(&self, project_id: i64, limit: usize) -> RepositoryResult<Vec<ImportJob>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM import_jobs WHERE project_id = ?1 ORDER BY created_at DESC LIMIT ?2",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![project_id, limit as i64], map_job_row)?;

        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row??);
        }
        Ok(jobs)
    }
}

/// Inner result carries decoding errors of state / summary columns.
fn map_job_row(row: &Row) -> rusqlite::Result<RepositoryResult<ImportJob>> {
    let state_raw: String = row.get(2)?;
    let summary_raw: Option<String> = row.get(10)?;

    let state = match state_raw.parse::<JobState>() {
        Ok(state) => state,
        Err(message) => {
            return Ok(Err(RepositoryError::FieldValueError {
                field: "state".to_string(),
                message,
            }))
        }
    };
    let error_summary = match summary_raw.as_deref() {
        None | Some("") => ErrorSummary::default(),
        Some(raw) => match serde_json::from_str(raw) {
            Ok(summary) => summary,
            Err(e) => {
                return Ok(Err(RepositoryError::FieldValueError {
                    field: "error_summary_json".to_string(),
                    message: e.to_string(),
                }))
            }
        },
    };

    Ok(Ok(ImportJob {
        job_id: row.get(0)?,
        project_id: row.get(1)?,
        state,
        total: row.get(3)?,
        processed: row.get(4)?,
        succeeded: row.get(5)?,
        failed: row.get(6)?,
        batch_size: row.get(7)?,
        concurrent_batches: row.get(8)?,
        file_path: row.get(9)?,
        error_summary,
        created_by: row.get(11)?,
        created_at: row.get(12)?,
        started_at: row.get(13)?,
        finished_at: row.get(14)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> ImportJobRepository {
        let conn = Connection::open_in_memory().unwrap();
        ImportJobRepository::new(Arc::new(Mutex::new(conn)))
    }

    fn pending(id: &str) -> ImportJob {
        ImportJob::new_pending(id.to_string(), 7, "/tmp/x.csv".to_string(), 30, 15, Some(1))
    }

    #[test]
    fn test_insert_and_find() {
        let repo = repo();
        repo.insert(&pending("job-1")).unwrap();

        let job = repo.find_by_id("job-1").unwrap().unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.batch_size, 30);
        assert_eq!(job.error_summary, ErrorSummary::default());
        assert!(repo.find_by_id("missing").unwrap().is_none());
    }

    #[test]
    fn test_claim_only_once() {
        let repo = repo();
        repo.insert(&pending("job-1")).unwrap();

        assert!(repo.claim("job-1", Utc::now()).unwrap());
        assert!(!repo.claim("job-1", Utc::now()).unwrap());

        let job = repo.find_by_id("job-1").unwrap().unwrap();
        assert_eq!(job.state, JobState::Running);
        assert!(job.started_at.is_some());
    }

    #[test]
    fn test_terminal_state_is_sticky() {
        let repo = repo();
        repo.insert(&pending("job-1")).unwrap();
        repo.claim("job-1", Utc::now()).unwrap();

        let counters = JobCounters {
            total: 3,
            processed: 3,
            succeeded: 2,
            failed: 1,
        };
        let summary = ErrorSummary {
            errors: vec!["row 3: parse: bad".to_string()],
            ..Default::default()
        };
        assert!(repo
            .finish("job-1", JobState::Succeeded, counters, &summary, Utc::now())
            .unwrap());
        assert!(!repo
            .finish("job-1", JobState::Cancelled, counters, &summary, Utc::now())
            .unwrap());

        let job = repo.find_by_id("job-1").unwrap().unwrap();
        assert_eq!(job.state, JobState::Succeeded);
        assert_eq!(job.counters(), counters);
        assert_eq!(job.error_summary.errors.len(), 1);

        assert!(matches!(
            repo.finish("job-1", JobState::Running, counters, &summary, Utc::now()),
            Err(RepositoryError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_fail_interrupted_and_list_recent() {
        let repo = repo();
        repo.insert(&pending("a")).unwrap();
        repo.insert(&pending("b")).unwrap();
        repo.claim("b", Utc::now()).unwrap();

        assert_eq!(repo.fail_interrupted("restart").unwrap(), 2);
        let jobs = repo.list_recent(7, 10).unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|j| j.state == JobState::Failed));
        assert_eq!(jobs[0].error_summary.reason.as_deref(), Some("restart"));
        assert!(repo.list_recent(8, 10).unwrap().is_empty());
    }
}
