// ==========================================
// Precast tracking backend - repository layer
// ==========================================
// Tables owned by this crate: import_jobs, activity_logs.
// Reference and catalog tables are read and written by the importer.
// All queries are parameterised.
// ==========================================

pub mod activity_log_repo;
pub mod error;
pub mod import_job_repo;

pub use activity_log_repo::ActivityLogRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use import_job_repo::ImportJobRepository;
