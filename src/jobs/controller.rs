// ==========================================
// Precast tracking backend - import job controller
// ==========================================
// submit() stores a pending job and returns at once; the pipeline
// runs in a spawned task:
//   claim (pending → running)
//   → read + assemble drafts (blocking, one pooled connection)
//   → BatchPool (pooled connection per draft)
//   → terminal state (succeeded | failed | cancelled)
// status() merges live counters with the stored row.
// cancel() signals the job's token, or cancels a job still pending.
// ==========================================

use crate::config::ImportConfig;
use crate::db::ConnectionPool;
use crate::domain::{
    ActivityAction, CallerContext, ElementTypeDraft, ErrorSummary, ImportJob, JobCounters,
    JobState, RowFailure, RowFailureKind,
};
use crate::importer::tabular_reader::FIXED_COLUMN_COUNT;
use crate::importer::{
    BatchPool, CancelToken, ColumnLayout, DraftPersister, ImportError, ReferenceResolver,
    RowAssembler, SqliteDraftPersister, TabularFormat, TabularReader,
};
use crate::jobs::progress::JobProgress;
use crate::jobs::registry::{JobHandle, JobRegistry};
use crate::repository::{ImportJobRepository, RepositoryError};
use crate::services::ActivityLogger;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("import job not found: {0}")]
    NotFound(String),

    #[error("invalid import request: {0}")]
    InvalidRequest(String),

    #[error("timed out waiting for job {0}")]
    Timeout(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub type JobResult<T> = Result<T, JobError>;

/// Job state as reported to callers.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub job_id: String,
    pub project_id: i64,
    pub state: JobState,
    pub total: i64,
    pub processed: i64,
    pub succeeded: i64,
    pub failed: i64,
    pub batch_size: i64,
    pub concurrent_batches: i64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl JobStatus {
    fn from_job(job: ImportJob, live: Option<(JobCounters, ErrorSummary)>) -> Self {
        // the stored row is only refreshed at phase ends; live counters are newer
        let (counters, summary) = match live {
            Some((counters, mut summary)) if !job.state.is_terminal() => {
                summary.reason = job.error_summary.reason.clone();
                (counters, summary)
            }
            _ => (job.counters(), job.error_summary.clone()),
        };
        Self {
            job_id: job.job_id,
            project_id: job.project_id,
            state: job.state,
            total: counters.total,
            processed: counters.processed,
            succeeded: counters.succeeded,
            failed: counters.failed,
            batch_size: job.batch_size,
            concurrent_batches: job.concurrent_batches,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            reason: summary.reason,
            errors: summary.errors,
            warnings: summary.warnings,
        }
    }

    pub fn counters(&self) -> JobCounters {
        JobCounters {
            total: self.total,
            processed: self.processed,
            succeeded: self.succeeded,
            failed: self.failed,
        }
    }
}

/// How a pipeline run ended, before it is written back.
enum RunEnd {
    Completed,
    Cancelled,
    Failed(String),
}

// ==========================================
// JobController
// ==========================================
pub struct JobController {
    pool: ConnectionPool,
    config: ImportConfig,
    jobs: Arc<ImportJobRepository>,
    persister: Arc<dyn DraftPersister>,
    registry: JobRegistry,
    activity: Option<ActivityLogger>,
    closing: AtomicBool,
}

impl JobController {
    pub fn new(pool: ConnectionPool, config: ImportConfig, jobs: Arc<ImportJobRepository>) -> Self {
        let persister = Arc::new(SqliteDraftPersister::new(pool.clone()));
        Self {
            pool,
            config,
            jobs,
            persister,
            registry: JobRegistry::new(),
            activity: None,
            closing: AtomicBool::new(false),
        }
    }

    pub fn with_activity_logger(mut self, logger: ActivityLogger) -> Self {
        self.activity = Some(logger);
        self
    }

    /// Replace the draft persister (the pooled SQLite one by default).
    pub fn with_persister(mut self, persister: Arc<dyn DraftPersister>) -> Self {
        self.persister = persister;
        self
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    /// Number of jobs with a live background task.
    pub fn live_jobs(&self) -> usize {
        self.registry.len()
    }

    /// Create a pending job for a staged file and start it in the background.
    ///
    /// # Arguments
    /// - batch_size / max_concurrency: raw requested values, clamped here
    ///
    /// # Returns
    /// The stored pending job; the pipeline has not necessarily started.
    #[instrument(skip(self, staged_file, caller), fields(user_id = caller.user_id))]
    pub fn submit(
        self: &Arc<Self>,
        project_id: i64,
        staged_file: &Path,
        batch_size: Option<i64>,
        max_concurrency: Option<i64>,
        caller: &CallerContext,
    ) -> JobResult<ImportJob> {
        if project_id <= 0 {
            return Err(JobError::InvalidRequest(format!(
                "invalid project id {}",
                project_id
            )));
        }
        TabularFormat::from_path(staged_file).map_err(|e| JobError::InvalidRequest(e.to_string()))?;

        let job = ImportJob::new_pending(
            uuid::Uuid::new_v4().to_string(),
            project_id,
            staged_file.to_string_lossy().into_owned(),
            self.config.clamp_batch_size(batch_size) as i64,
            self.config.clamp_concurrency(max_concurrency) as i64,
            Some(caller.user_id),
        );
        self.jobs.insert(&job)?;

        tracing::info!(
            job_id = %job.job_id,
            batch_size = job.batch_size,
            concurrent_batches = job.concurrent_batches,
            "import job submitted"
        );
        self.log_activity(
            caller,
            project_id,
            ActivityAction::ImportSubmitted,
            serde_json::json!({
                "job_id": job.job_id,
                "file_path": job.file_path,
                "batch_size": job.batch_size,
                "concurrent_batches": job.concurrent_batches,
            }),
        );

        let controller = Arc::clone(self);
        let pending = job.clone();
        let caller = caller.clone();
        tokio::spawn(async move { controller.run(pending, caller).await });

        Ok(job)
    }

    /// State, counters, timestamps and error summary of a job.
    pub fn status(&self, job_id: &str) -> JobResult<JobStatus> {
        // read live progress first: if the job finishes in between, the
        // stored row is already terminal and wins
        let live = self.registry.get(job_id).map(|h| h.progress.snapshot());
        let job = self
            .jobs
            .find_by_id(job_id)?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        Ok(JobStatus::from_job(job, live))
    }

    /// Cooperative cancellation. Idempotent; a terminal job is left alone.
    pub fn cancel(&self, job_id: &str, caller: &CallerContext) -> JobResult<()> {
        let job = self
            .jobs
            .find_by_id(job_id)?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        if job.state.is_terminal() {
            tracing::debug!(job_id, state = %job.state, "cancel on terminal job ignored");
            return Ok(());
        }

        if self.registry.cancel(job_id) {
            tracing::info!(job_id, "cancellation signalled");
        } else {
            // not started yet: cancel the stored row directly
            let summary = ErrorSummary {
                reason: Some("cancelled before start".to_string()),
                ..Default::default()
            };
            let written = self.jobs.finish(
                job_id,
                JobState::Cancelled,
                job.counters(),
                &summary,
                Utc::now(),
            )?;
            // lost the race against claim(); the task is registered by now
            if !written && !self.registry.cancel(job_id) {
                tracing::debug!(job_id, "job finished before cancellation");
            } else {
                tracing::info!(job_id, "pending job cancelled");
            }
        }

        self.log_activity(
            caller,
            job.project_id,
            ActivityAction::ImportCancelled,
            serde_json::json!({ "job_id": job_id }),
        );
        Ok(())
    }

    pub fn recent_jobs(&self, project_id: i64, limit: usize) -> JobResult<Vec<ImportJob>> {
        Ok(self.jobs.list_recent(project_id, limit)?)
    }

    /// Poll until the job is terminal.
    pub async fn wait_for_terminal(&self, job_id: &str, timeout: Duration) -> JobResult<JobStatus> {
        let deadline = Instant::now() + timeout;
        loop {
            let status = self.status(job_id)?;
            if status.state.is_terminal() && self.registry.get(job_id).is_none() {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                return Err(JobError::Timeout(job_id.to_string()));
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Stop starting new jobs, cancel live ones and wait for them to finish.
    ///
    /// Jobs still pending stay pending and are failed on the next start.
    pub async fn shutdown(&self, timeout: Duration) -> usize {
        self.closing.store(true, Ordering::SeqCst);
        let signalled = self.registry.cancel_all();
        let deadline = Instant::now() + timeout;
        while !self.registry.is_empty() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        if !self.registry.is_empty() {
            tracing::warn!(live = self.registry.len(), "jobs still running at shutdown");
        }
        signalled
    }

    // ==========================================
    // Background pipeline
    // ==========================================

    #[instrument(skip_all, fields(job_id = %job.job_id, project_id = job.project_id))]
    async fn run(self: Arc<Self>, job: ImportJob, caller: CallerContext) {
        if self.closing.load(Ordering::SeqCst) {
            tracing::info!("controller closing, job left pending");
            return;
        }

        let handle = JobHandle::new(self.config.max_error_summaries);
        self.registry.register(&job.job_id, handle.clone());

        let started_at = Utc::now();
        match self.jobs.claim(&job.job_id, started_at) {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!("job no longer pending, not started");
                self.registry.deregister(&job.job_id);
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to claim job");
                self.registry.deregister(&job.job_id);
                return;
            }
        }
        tracing::info!("import job running");

        let clock = Instant::now();
        let end = self.execute(&job, &handle).await;
        let (state, reason) = self.resolve_state(end, &handle);

        let (counters, mut summary) = handle.progress.snapshot();
        summary.reason = reason;
        match self
            .jobs
            .finish(&job.job_id, state, counters, &summary, Utc::now())
        {
            Ok(true) => {}
            Ok(false) => tracing::warn!("job was already terminal"),
            Err(e) => tracing::error!(error = %e, "failed to store terminal job state"),
        }

        tracing::info!(
            state = %state,
            total = counters.total,
            succeeded = counters.succeeded,
            failed = counters.failed,
            elapsed_ms = clock.elapsed().as_millis() as u64,
            "import job finished"
        );
        self.log_activity(
            &caller,
            job.project_id,
            ActivityAction::ImportFinished,
            serde_json::json!({
                "job_id": job.job_id,
                "state": state.as_str(),
                "total": counters.total,
                "succeeded": counters.succeeded,
                "failed": counters.failed,
                "reason": summary.reason,
            }),
        );
        self.registry.deregister(&job.job_id);
    }

    async fn execute(&self, job: &ImportJob, handle: &JobHandle) -> RunEnd {
        let drafts = match self.assemble(job, handle).await {
            Ok(drafts) => drafts,
            Err(ImportError::Cancelled) => return RunEnd::Cancelled,
            Err(e) => return RunEnd::Failed(e.to_string()),
        };

        let (counters, summary) = handle.progress.snapshot();
        if let Err(e) = self.jobs.update_progress(&job.job_id, counters, &summary) {
            tracing::warn!(error = %e, "failed to store parse progress");
        }
        if handle.cancel.is_cancelled() {
            return RunEnd::Cancelled;
        }

        let pool = BatchPool::new(self.persister.clone(), self.config.clone());
        let report = pool
            .process(
                drafts,
                job.batch_size.max(1) as usize,
                job.concurrent_batches.max(1) as usize,
                &handle.cancel,
                handle.progress.clone(),
            )
            .await;

        match report.fatal {
            Some(reason) => RunEnd::Failed(reason),
            None if report.cancelled || handle.cancel.is_cancelled() => RunEnd::Cancelled,
            None => RunEnd::Completed,
        }
    }

    fn resolve_state(&self, end: RunEnd, handle: &JobHandle) -> (JobState, Option<String>) {
        match end {
            RunEnd::Failed(reason) => (JobState::Failed, Some(reason)),
            RunEnd::Cancelled => (JobState::Cancelled, None),
            RunEnd::Completed => match handle.progress.database_errors() {
                0 => (JobState::Succeeded, None),
                n => (
                    JobState::Failed,
                    Some(format!("{} row(s) failed with a database error", n)),
                ),
            },
        }
    }

    /// Read and assemble every row on one pooled connection.
    async fn assemble(&self, job: &ImportJob, handle: &JobHandle) -> Result<Vec<ElementTypeDraft>, ImportError> {
        let conn = self.pool.acquire().await?;
        let job = job.clone();
        let progress = handle.progress.clone();
        let cancel = handle.cancel.clone();

        tokio::task::spawn_blocking(move || assemble_drafts(&conn, &job, &progress, &cancel))
            .await
            .map_err(|e| ImportError::InternalError(format!("assemble task failed: {}", e)))?
    }

    fn log_activity(
        &self,
        caller: &CallerContext,
        project_id: i64,
        action: ActivityAction,
        detail: serde_json::Value,
    ) {
        if let Some(logger) = &self.activity {
            logger.record_action(caller, Some(project_id), action, Some(detail));
        }
    }
}

/// Stream the staged file through the assembler.
///
/// Row-level failures are recorded into `progress`; file-level and
/// fatal database errors end the run.
fn assemble_drafts(
    conn: &rusqlite::Connection,
    job: &ImportJob,
    progress: &JobProgress,
    cancel: &CancelToken,
) -> Result<Vec<ElementTypeDraft>, ImportError> {
    let reader = TabularReader::open(Path::new(&job.file_path))?;
    let resolver = ReferenceResolver::new(job.project_id);
    let layout = ColumnLayout::new(resolver.dictionary_sizes(conn)?);

    let width = reader.header().len();
    if width < FIXED_COLUMN_COUNT || width != layout.expected_width() {
        tracing::warn!(width, expected = layout.expected_width(), "header width differs from template");
        progress.add_warning(format!(
            "header has {} columns, project template has {}",
            width,
            layout.expected_width()
        ));
    }

    let assembler = RowAssembler::new(layout, &resolver, job.created_by);
    let mut drafts = Vec::new();
    for row in reader {
        if cancel.is_cancelled() {
            return Err(ImportError::Cancelled);
        }
        let row = match row {
            Ok(row) => row,
            Err(ImportError::InvalidRow { row, message }) => {
                tracing::debug!(row_number = row, %message, "unreadable row skipped");
                progress.add_total(1);
                progress.record_failure(&RowFailure::new(row, None, RowFailureKind::Parse, message));
                continue;
            }
            Err(e) => return Err(e),
        };
        progress.add_total(1);

        match assembler.assemble(conn, &row) {
            Ok(draft) => drafts.push(draft),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                let kind = match e {
                    ImportError::InvalidRow { .. } => RowFailureKind::Parse,
                    _ => RowFailureKind::DatabaseError,
                };
                let message = match e {
                    ImportError::InvalidRow { message, .. } => message,
                    other => other.to_string(),
                };
                let code = Some(row.cell(0).to_string()).filter(|c| !c.is_empty());
                tracing::debug!(row_number = row.row_number, %message, "row rejected");
                progress.record_failure(&RowFailure::new(row.row_number, code, kind, message));
            }
        }
    }

    tracing::info!(
        drafts = drafts.len(),
        rejected = progress.counters().failed,
        lookups_cached = resolver.cached_len(),
        "rows assembled"
    );
    Ok(drafts)
}
