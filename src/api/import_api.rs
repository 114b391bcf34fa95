// ==========================================
// Precast tracking backend - element type import API
// ==========================================
// Thin adapter between transport and the job controller:
// validate the request, stage the upload, hand over, shape the reply.
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::db::ConnectionPool;
use crate::domain::{ActivityAction, CallerContext, ImportJob};
use crate::importer::{ReferenceResolver, TabularFormat, TemplateLayout};
use crate::jobs::{JobController, JobStatus};
use crate::services::{ActivityLogger, FileStorage};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Reply to an accepted upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: String,
    /// Always "pending": the pipeline runs after the reply
    pub status: String,
    pub batch_size: i64,
    pub concurrent_batches: i64,
    pub file_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

/// Generated import template.
#[derive(Debug, Clone)]
pub struct TemplateFile {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

pub struct ImportApi {
    controller: Arc<JobController>,
    storage: Arc<dyn FileStorage>,
    pool: ConnectionPool,
    activity: Option<ActivityLogger>,
}

impl ImportApi {
    pub fn new(
        controller: Arc<JobController>,
        storage: Arc<dyn FileStorage>,
        pool: ConnectionPool,
    ) -> Self {
        Self {
            controller,
            storage,
            pool,
            activity: None,
        }
    }

    pub fn with_activity_logger(mut self, logger: ActivityLogger) -> Self {
        self.activity = Some(logger);
        self
    }

    pub fn controller(&self) -> &Arc<JobController> {
        &self.controller
    }

    /// Stage an uploaded file and create its import job.
    ///
    /// # Arguments
    /// - file_name: client-side name, used for format detection
    /// - batch_size / concurrent_batches: already parsed as integers; clamped downstream
    ///
    /// # Returns
    /// - Ok(SubmitResponse) with status "pending"
    /// - Err(BadRequest): bad project id, missing/empty file, unsupported extension
    /// - Err(Internal): staging or job creation failed
    pub async fn submit(
        &self,
        project_id: i64,
        file_name: &str,
        bytes: Vec<u8>,
        batch_size: Option<i64>,
        concurrent_batches: Option<i64>,
        caller: &CallerContext,
    ) -> ApiResult<SubmitResponse> {
        if project_id <= 0 {
            return Err(ApiError::BadRequest(format!(
                "invalid project id {}",
                project_id
            )));
        }
        if file_name.trim().is_empty() {
            return Err(ApiError::BadRequest("missing file name".to_string()));
        }
        if bytes.is_empty() {
            return Err(ApiError::BadRequest("uploaded file is empty".to_string()));
        }
        // reject before anything touches the disk
        TabularFormat::from_path(Path::new(file_name))?;

        let staged = self.storage.stage(project_id, file_name, bytes).await?;
        let job = self.controller.submit(
            project_id,
            &staged.path,
            batch_size,
            concurrent_batches,
            caller,
        )?;

        Ok(SubmitResponse {
            job_id: job.job_id,
            status: job.state.as_str().to_string(),
            batch_size: job.batch_size,
            concurrent_batches: job.concurrent_batches,
            file_path: job.file_path,
        })
    }

    pub fn status(&self, job_id: &str) -> ApiResult<JobStatus> {
        Ok(self.controller.status(job_id)?)
    }

    pub fn cancel(&self, job_id: &str, caller: &CallerContext) -> ApiResult<CancelResponse> {
        self.controller.cancel(job_id, caller)?;
        Ok(CancelResponse { cancelled: true })
    }

    pub fn recent_jobs(&self, project_id: i64, limit: usize) -> ApiResult<Vec<ImportJob>> {
        Ok(self.controller.recent_jobs(project_id, limit.clamp(1, 200))?)
    }

    /// Spreadsheet template for a project's current dictionaries.
    pub async fn template(&self, project_id: i64, caller: &CallerContext) -> ApiResult<TemplateFile> {
        if project_id <= 0 {
            return Err(ApiError::BadRequest(format!(
                "invalid project id {}",
                project_id
            )));
        }

        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        let (bytes, columns) = tokio::task::spawn_blocking(move || {
            let resolver = ReferenceResolver::new(project_id);
            let layout = TemplateLayout::load(&conn, &resolver)?;
            let columns = layout.column_layout().expected_width();
            layout.to_xlsx().map(|bytes| (bytes, columns))
        })
        .await
        .map_err(|e| ApiError::Internal(format!("template task failed: {}", e)))??;

        tracing::info!(project_id, columns, size = bytes.len(), "import template generated");
        if let Some(logger) = &self.activity {
            logger.record_action(
                caller,
                Some(project_id),
                ActivityAction::TemplateExported,
                Some(serde_json::json!({ "columns": columns })),
            );
        }

        Ok(TemplateFile {
            file_name: format!("element_type_template_{}.xlsx", project_id),
            content_type: XLSX_CONTENT_TYPE,
            bytes,
        })
    }
}
