// ==========================================
// Precast tracking backend - domain layer
// ==========================================
// Entities, drafts and enumerations.
// No data access, no import logic.
// ==========================================

pub mod activity_log;
pub mod caller;
pub mod element_type;
pub mod import_job;
pub mod reference;
pub mod types;

pub use activity_log::{ActivityAction, ActivityLog};
pub use caller::CallerContext;
pub use element_type::{
    BomLine, Dimensions, DrawingDraft, ElementTypeDraft, HierarchyQuantityDraft,
    INITIAL_VERSION_CODE,
};
pub use import_job::{ErrorSummary, ImportJob, JobCounters, RowFailure, RowOutcome};
pub use reference::{bom_name_id, DictionarySizes, RefEntry};
pub use types::{CellFlag, JobState, RefCategory, RowFailureKind};
