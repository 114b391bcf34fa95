// ==========================================
// Precast tracking backend - import jobs
// ==========================================
// Job lifecycle on top of the importer:
//   controller  submit / status / cancel, background pipeline
//   progress    shared counters and bounded error lists
//   registry    job_id → cancel token + progress of live jobs
// ==========================================

pub mod controller;
pub mod progress;
pub mod registry;

pub use controller::{JobController, JobError, JobResult, JobStatus};
pub use progress::JobProgress;
pub use registry::{JobHandle, JobRegistry};
