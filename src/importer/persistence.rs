// ==========================================
// Precast tracking backend - persistence unit
// ==========================================
// One draft, one IMMEDIATE transaction:
//   1. element_type
//   2. element_type_path (stage ids as JSON, when non-empty)
//   3. drawings (current_version = VR-1)
//   4. element_type_hierarchy_quantity (naming_convention re-read in tx)
//   5. element_type_bom (BOM lines as JSON)
//   6. commit
// Then element-instance expansion, one transaction per hierarchy row.
// Expansion failures become warnings; the catalog row stays.
// ==========================================

use crate::db::ConnectionPool;
use crate::domain::{ElementTypeDraft, RowFailure, RowFailureKind, RowOutcome};
use crate::importer::batch_pool::DraftPersister;
use crate::importer::cancel::CancelToken;
use crate::importer::error::{is_connection_failure, ImportError, ImportResult};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction, TransactionBehavior};

/// Why a draft's transaction rolled back.
#[derive(Debug)]
enum PersistFailure {
    Duplicate,
    Vanished(String),
    Db(rusqlite::Error),
    Encode(serde_json::Error),
}

impl From<rusqlite::Error> for PersistFailure {
    fn from(err: rusqlite::Error) -> Self {
        PersistFailure::Db(err)
    }
}

impl From<serde_json::Error> for PersistFailure {
    fn from(err: serde_json::Error) -> Self {
        PersistFailure::Encode(err)
    }
}

/// Committed hierarchy row awaiting expansion.
#[derive(Debug, Clone)]
struct ExpansionTarget {
    hierarchy_id: i64,
    path: String,
    quantity: i64,
    naming_convention: String,
}

/// Persist one draft and expand its element instances.
///
/// # Returns
/// - Ok(Persisted): catalog rows committed; expansion warnings attached
/// - Ok(Failed): nothing committed for this draft
/// - Err(FatalDatabase): the connection itself is unusable
pub fn persist_draft(conn: &mut Connection, draft: &ElementTypeDraft) -> ImportResult<RowOutcome> {
    let (element_type_id, targets) = match insert_catalog(conn, draft) {
        Ok(committed) => committed,
        Err(failure) => return row_failure(draft, failure).map(RowOutcome::Failed),
    };

    let mut instances_created = 0;
    let mut warnings = Vec::new();
    for target in &targets {
        match expand_instances(conn, draft, element_type_id, target) {
            Ok(created) => instances_created += created,
            Err(e) => {
                tracing::warn!(
                    row_number = draft.row_number,
                    element_type = %draft.code,
                    hierarchy = %target.path,
                    error = %e,
                    "element expansion failed"
                );
                warnings.push(format!(
                    "row {} ({}): element expansion for '{}' failed: {}",
                    draft.row_number, draft.code, target.path, e
                ));
            }
        }
    }

    Ok(RowOutcome::Persisted {
        element_type_id,
        instances_created,
        warnings,
    })
}

fn row_failure(draft: &ElementTypeDraft, failure: PersistFailure) -> ImportResult<RowFailure> {
    let code = Some(draft.code.clone());
    let failure = match failure {
        PersistFailure::Duplicate => RowFailure::new(
            draft.row_number,
            code,
            RowFailureKind::Duplicate,
            format!(
                "element_type '{}' already exists in project {}",
                draft.code, draft.project_id
            ),
        ),
        PersistFailure::Vanished(path) => RowFailure::new(
            draft.row_number,
            code,
            RowFailureKind::ReferenceVanished,
            format!("hierarchy node '{}' no longer exists", path),
        ),
        PersistFailure::Db(e) if is_connection_failure(&e) => {
            return Err(ImportError::FatalDatabase(e.to_string()))
        }
        PersistFailure::Db(e) => {
            RowFailure::new(draft.row_number, code, RowFailureKind::DatabaseError, e.to_string())
        }
        PersistFailure::Encode(e) => {
            RowFailure::new(draft.row_number, code, RowFailureKind::DatabaseError, e.to_string())
        }
    };
    tracing::debug!(failure = %failure.summary(), "draft rolled back");
    Ok(failure)
}

fn now_stamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn insert_catalog(
    conn: &mut Connection,
    draft: &ElementTypeDraft,
) -> Result<(i64, Vec<ExpansionTarget>), PersistFailure> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let now = now_stamp();

    // 1. element_type
    let element_type_id = insert_element_type(&tx, draft, &now)?;

    // 2. stage path
    if !draft.stage_path.is_empty() {
        tx.execute(
            "INSERT INTO element_type_path (element_type_id, stage_path, created_at) VALUES (?1, ?2, ?3)",
            params![element_type_id, serde_json::to_string(&draft.stage_path)?, now],
        )?;
    }

    // 3. drawings
    for drawing in &draft.drawings {
        tx.execute(
            r#"
            INSERT INTO drawings (
              project_id, element_type_id, drawing_type_id, current_version,
              file, comments, created_by, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, '', ?6, ?7, ?7)
            "#,
            params![
                draft.project_id,
                element_type_id,
                drawing.drawing_type_id,
                draft.version_code,
                drawing.file,
                draft.created_by,
                now,
            ],
        )?;
    }

    // 4. hierarchy quantities
    let mut targets = Vec::with_capacity(draft.hierarchy_quantities.len());
    for hq in &draft.hierarchy_quantities {
        let naming_convention: Option<Option<String>> = tx
            .query_row(
                "SELECT naming_convention FROM precast WHERE id = ?1 AND project_id = ?2",
                params![hq.hierarchy_id, draft.project_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(naming_convention) = naming_convention else {
            return Err(PersistFailure::Vanished(hq.path.clone()));
        };
        let naming_convention = naming_convention.unwrap_or_default();

        tx.execute(
            r#"
            INSERT INTO element_type_hierarchy_quantity (
              element_type_id, hierarchy_id, quantity, naming_convention, left_quantity
            ) VALUES (?1, ?2, ?3, ?4, 0)
            "#,
            params![element_type_id, hq.hierarchy_id, hq.quantity, naming_convention],
        )?;
        targets.push(ExpansionTarget {
            hierarchy_id: hq.hierarchy_id,
            path: hq.path.clone(),
            quantity: hq.quantity,
            naming_convention,
        });
    }

    // 5. BOM
    tx.execute(
        "INSERT INTO element_type_bom (element_type_id, project_id, product_json, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            element_type_id,
            draft.project_id,
            serde_json::to_string(&draft.bom_lines)?,
            now
        ],
    )?;

    // 6. commit (any early return above drops tx, which rolls back)
    tx.commit()?;
    Ok((element_type_id, targets))
}

fn insert_element_type(
    tx: &Transaction<'_>,
    draft: &ElementTypeDraft,
    now: &str,
) -> Result<i64, PersistFailure> {
    let d = &draft.dimensions;
    let result = tx.execute(
        r#"
        INSERT INTO element_type (
          project_id, element_type, element_type_name,
          height, length, thickness, mass, volume, area, width, density,
          element_type_version, total_count_element, instance_count,
          created_by, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 0, ?14, ?15, ?15)
        "#,
        params![
            draft.project_id,
            draft.code,
            draft.name,
            d.height,
            d.length,
            d.thickness,
            d.mass,
            d.volume,
            d.area,
            d.width,
            draft.density,
            draft.version_code,
            draft.total_count_element,
            draft.created_by,
            now,
        ],
    );

    match result {
        Ok(_) => Ok(tx.last_insert_rowid()),
        Err(e) if is_unique_violation(&e) => Err(PersistFailure::Duplicate),
        Err(e) => Err(PersistFailure::Db(e)),
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, msg) => {
            e.code == ErrorCode::ConstraintViolation
                && msg.as_deref().map(|m| m.contains("UNIQUE")).unwrap_or(false)
        }
        _ => false,
    }
}

/// Generate `quantity` element rows for one hierarchy row.
///
/// Identifiers are `{code}{naming_convention}{index}`; the index
/// continues from the element type's `instance_count`.
fn expand_instances(
    conn: &mut Connection,
    draft: &ElementTypeDraft,
    element_type_id: i64,
    target: &ExpansionTarget,
) -> ImportResult<i64> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let now = now_stamp();

    let seed: i64 = tx.query_row(
        "SELECT instance_count FROM element_type WHERE element_type_id = ?1",
        params![element_type_id],
        |row| row.get(0),
    )?;
    let last = seed
        .checked_add(target.quantity)
        .ok_or_else(|| ImportError::InvalidRow {
            row: draft.row_number,
            message: format!("element index overflows after {}", seed),
        })?;

    {
        let mut stmt = tx.prepare(
            r#"
            INSERT INTO element (project_id, element_type_id, hierarchy_id, element_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )?;
        for index in seed + 1..=last {
            let element_id = format!("{}{}{}", draft.code, target.naming_convention, index);
            stmt.execute(params![
                draft.project_id,
                element_type_id,
                target.hierarchy_id,
                element_id,
                now
            ])?;
        }
    }

    tx.execute(
        "UPDATE element_type SET instance_count = instance_count + ?1, updated_at = ?2 WHERE element_type_id = ?3",
        params![target.quantity, now, element_type_id],
    )?;
    tx.commit()?;
    Ok(target.quantity)
}

// ==========================================
// SqliteDraftPersister - pooled, async entry point
// ==========================================

/// Persists drafts on connections checked out of the shared pool,
/// one checkout per draft.
pub struct SqliteDraftPersister {
    pool: ConnectionPool,
}

impl SqliteDraftPersister {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DraftPersister for SqliteDraftPersister {
    async fn persist(
        &self,
        draft: &ElementTypeDraft,
        cancel: &CancelToken,
    ) -> ImportResult<RowOutcome> {
        if cancel.is_cancelled() {
            return Err(ImportError::Cancelled);
        }

        let mut conn = self.pool.acquire().await?;
        let draft = draft.clone();
        tokio::task::spawn_blocking(move || persist_draft(&mut conn, &draft))
            .await
            .map_err(|e| ImportError::InternalError(format!("persist task failed: {}", e)))?
    }
}
