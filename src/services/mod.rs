// ==========================================
// Precast tracking backend - collaborator services
// ==========================================
// Interfaces the import core consumes from the rest of the backend:
//   SessionValidator  bearer token → CallerContext
//   FileStorage       upload bytes → staged file on disk
//   ActivityLogger    bounded queue drained into activity_logs
// ==========================================

pub mod activity_logger;
pub mod file_storage;
pub mod session;

pub use activity_logger::{ActivityLogWorker, ActivityLogger};
pub use file_storage::{FileStorage, LocalFileStorage, StagedFile, StorageError};
pub use session::{bearer_token, AuthError, SessionValidator, SqliteSessionValidator};
