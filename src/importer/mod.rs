// ==========================================
// Precast tracking backend - import layer
// ==========================================
// Bulk element-type import:
//   header_decode       label normalisation
//   reference_resolver  labels → project foreign keys (C1)
//   tabular_reader      CSV / spreadsheet rows + column layout (C2)
//   row_assembler       RawRow → ElementTypeDraft (C3)
//   persistence         atomic multi-table insert + expansion (C4)
//   batch_pool          bounded parallel batches (C5)
//   template            import template emitter (C7)
// Job lifecycle (C6) lives in crate::jobs.
// ==========================================

pub mod batch_pool;
pub mod cancel;
pub mod error;
pub mod header_decode;
pub mod persistence;
pub mod reference_resolver;
pub mod row_assembler;
pub mod tabular_reader;
pub mod template;

pub use batch_pool::{
    partition, BatchPool, BatchReport, BatchResult, DraftPersister, NoProgress, ProgressObserver,
};
pub use cancel::CancelToken;
pub use error::{ImportError, ImportResult};
pub use header_decode::decode_header;
pub use persistence::{persist_draft, SqliteDraftPersister};
pub use reference_resolver::ReferenceResolver;
pub use row_assembler::RowAssembler;
pub use tabular_reader::{ColumnKind, ColumnLayout, FixedColumn, RawRow, TabularFormat, TabularReader};
pub use template::{TemplateLayout, TemplateSection};
