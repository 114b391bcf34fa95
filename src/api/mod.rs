// ==========================================
// Precast tracking backend - API layer
// ==========================================
// Transport-independent entry points used by the HTTP server.
// ==========================================

pub mod error;
pub mod import_api;

pub use error::{ApiError, ApiResult};
pub use import_api::{CancelResponse, ImportApi, SubmitResponse, TemplateFile, XLSX_CONTENT_TYPE};
