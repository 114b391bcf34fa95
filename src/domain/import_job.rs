// ==========================================
// Precast tracking backend - import job model
// ==========================================
// Aligned with the import_jobs table; counters satisfy
// processed = succeeded + failed at every observation.
// ==========================================

use crate::domain::types::{JobState, RowFailureKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// ImportJob - persisted job record
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
    pub job_id: String,
    pub project_id: i64,
    pub state: JobState,
    pub total: i64,
    pub processed: i64,
    pub succeeded: i64,
    pub failed: i64,
    pub batch_size: i64,
    pub concurrent_batches: i64,
    pub file_path: String,
    pub error_summary: ErrorSummary,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ImportJob {
    pub fn new_pending(
        job_id: String,
        project_id: i64,
        file_path: String,
        batch_size: i64,
        concurrent_batches: i64,
        created_by: Option<i64>,
    ) -> Self {
        Self {
            job_id,
            project_id,
            state: JobState::Pending,
            total: 0,
            processed: 0,
            succeeded: 0,
            failed: 0,
            batch_size,
            concurrent_batches,
            file_path,
            error_summary: ErrorSummary::default(),
            created_by,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
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

/// Progress counters of one job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounters {
    pub total: i64,
    pub processed: i64,
    pub succeeded: i64,
    pub failed: i64,
}

/// Serialized into `import_jobs.error_summary_json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorSummary {
    /// Short reason for a failed job (file unreadable, fatal database error)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

// ==========================================
// RowFailure / RowOutcome - per-draft result
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowFailure {
    pub row_number: usize,
    pub code: Option<String>,
    pub kind: RowFailureKind,
    pub message: String,
}

impl RowFailure {
    pub fn new(
        row_number: usize,
        code: Option<String>,
        kind: RowFailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            row_number,
            code,
            kind,
            message: message.into(),
        }
    }

    /// One-line summary shown in the job's `errors[]`.
    pub fn summary(&self) -> String {
        match &self.code {
            Some(code) => format!(
                "row {} ({}): {}: {}",
                self.row_number, code, self.kind, self.message
            ),
            None => format!("row {}: {}: {}", self.row_number, self.kind, self.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RowOutcome {
    Persisted {
        element_type_id: i64,
        instances_created: i64,
        warnings: Vec<String>,
    },
    Failed(RowFailure),
}

impl RowOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RowOutcome::Persisted { .. })
    }
}
