// ==========================================
// Precast tracking backend - element type import engine
// ==========================================
// Bulk import of element types from CSV / spreadsheet uploads:
// reference resolution, row assembly, atomic persistence, bounded
// parallel batches and a job lifecycle with cooperative cancellation.
// ==========================================

// ==========================================
// Modules
// ==========================================

// Domain layer - entities and enumerations
pub mod domain;

// Repository layer - job and activity log storage
pub mod repository;

// Import layer - reader, resolver, assembler, persistence, batches
pub mod importer;

// Job layer - lifecycle, progress, cancellation
pub mod jobs;

// Configuration
pub mod config;

// Database infrastructure (PRAGMAs, connection pool)
pub mod db;

// Logging
pub mod logging;

// Collaborators: sessions, file storage, activity log queue
pub mod services;

// API layer
pub mod api;

// HTTP server
pub mod server;

// ==========================================
// Re-exports
// ==========================================

pub use api::{ApiError, ImportApi};
pub use config::{ImportConfig, ServerConfig};
pub use db::ConnectionPool;
pub use domain::{ElementTypeDraft, ImportJob, JobState, RowOutcome};
pub use importer::{ImportError, ImportResult};
pub use jobs::{JobController, JobStatus};

// ==========================================
// Constants
// ==========================================

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const APP_NAME: &str = "precast-import";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
