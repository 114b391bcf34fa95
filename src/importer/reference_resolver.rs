// ==========================================
// Precast tracking backend - reference resolver
// ==========================================
// Translates header labels into project-local foreign keys:
//   drawing_type → drawing_types.name
//   stage        → project_stages.name
//   hierarchy    → precast.path
//   bom_product  → bom_products.name_id
// Lookups are memoized per job; misses are cached too.
// Read-only: never writes to a reference table.
// ==========================================

use crate::domain::{DictionarySizes, RefCategory, RefEntry};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::header_decode::decode_header;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::Mutex;

type CacheKey = (RefCategory, String);

// ==========================================
// ReferenceResolver
// ==========================================
pub struct ReferenceResolver {
    project_id: i64,
    cache: Mutex<HashMap<CacheKey, Option<RefEntry>>>,
}

impl ReferenceResolver {
    pub fn new(project_id: i64) -> Self {
        Self {
            project_id,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn project_id(&self) -> i64 {
        self.project_id
    }

    /// Resolve a label to its reference entry.
    ///
    /// # Arguments
    /// - conn: connection used on a cache miss
    /// - category: dictionary to search
    /// - raw_label: label as written in the file (decoded before lookup)
    ///
    /// # Returns
    /// - Ok(RefEntry): id plus the auxiliary column for the category
    /// - Err(ReferenceNotFound): the decoded label is not in the project
    /// - Err(Database / FatalDatabase): query failure
    pub fn resolve(
        &self,
        conn: &Connection,
        category: RefCategory,
        raw_label: &str,
    ) -> ImportResult<RefEntry> {
        let label = decode_header(raw_label);
        let key = (category, label);

        if let Some(hit) = self.cached(&key) {
            return hit.ok_or(ImportError::ReferenceNotFound {
                category,
                label: key.1,
            });
        }

        // Concurrent misses for the same key may both query; results are identical.
        let found = query_reference(conn, self.project_id, category, &key.1)?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.entry(key.clone()).or_insert_with(|| found.clone());
        }

        found.ok_or(ImportError::ReferenceNotFound {
            category,
            label: key.1,
        })
    }

    /// Like `resolve`, but a missing label is `Ok(None)`.
    pub fn try_resolve(
        &self,
        conn: &Connection,
        category: RefCategory,
        raw_label: &str,
    ) -> ImportResult<Option<RefEntry>> {
        match self.resolve(conn, category, raw_label) {
            Ok(entry) => Ok(Some(entry)),
            Err(ImportError::ReferenceNotFound { category, label }) => {
                tracing::debug!(%category, label = %label, "reference label skipped");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Dictionary sizes S, D, H, B for column classification.
    pub fn dictionary_sizes(&self, conn: &Connection) -> ImportResult<DictionarySizes> {
        Ok(DictionarySizes {
            stages: count(conn, "project_stages", self.project_id)?,
            drawing_types: count(conn, "drawing_types", self.project_id)?,
            hierarchy_nodes: count(conn, "precast", self.project_id)?,
            bom_products: count(conn, "bom_products", self.project_id)?,
        })
    }

    /// Column labels of a dictionary in template order.
    ///
    /// Stages follow `stage_order`; the others follow id.
    pub fn labels(&self, conn: &Connection, category: RefCategory) -> ImportResult<Vec<String>> {
        let sql = match category {
            RefCategory::Stage => {
                "SELECT name FROM project_stages WHERE project_id = ?1 ORDER BY stage_order, id"
            }
            RefCategory::DrawingType => {
                "SELECT name FROM drawing_types WHERE project_id = ?1 ORDER BY id"
            }
            RefCategory::Hierarchy => "SELECT path FROM precast WHERE project_id = ?1 ORDER BY id",
            RefCategory::BomProduct => {
                "SELECT name_id FROM bom_products WHERE project_id = ?1 ORDER BY id"
            }
        };

        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![self.project_id], |row| row.get::<_, String>(0))?;
        let mut labels = Vec::new();
        for row in rows {
            labels.push(row?);
        }
        Ok(labels)
    }

    /// Number of memoized keys (hits and misses).
    pub fn cached_len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn cached(&self, key: &CacheKey) -> Option<Option<RefEntry>> {
        self.cache.lock().ok().and_then(|cache| cache.get(key).cloned())
    }
}

fn query_reference(
    conn: &Connection,
    project_id: i64,
    category: RefCategory,
    label: &str,
) -> ImportResult<Option<RefEntry>> {
    let sql = match category {
        RefCategory::DrawingType => {
            "SELECT id, NULL FROM drawing_types WHERE project_id = ?1 AND name = ?2 LIMIT 1"
        }
        RefCategory::Stage => {
            "SELECT id, NULL FROM project_stages WHERE project_id = ?1 AND name = ?2 LIMIT 1"
        }
        RefCategory::Hierarchy => {
            "SELECT id, naming_convention FROM precast WHERE project_id = ?1 AND path = ?2 LIMIT 1"
        }
        RefCategory::BomProduct => {
            "SELECT id, product_name FROM bom_products WHERE project_id = ?1 AND name_id = ?2 LIMIT 1"
        }
    };

    let entry = conn
        .query_row(sql, params![project_id, label], |row| {
            Ok(RefEntry {
                id: row.get(0)?,
                detail: row.get(1)?,
            })
        })
        .optional()?;
    Ok(entry)
}

fn count(conn: &Connection, table: &str, project_id: i64) -> ImportResult<usize> {
    // table names come from the fixed list above, never from input
    let sql = format!("SELECT COUNT(*) FROM {} WHERE project_id = ?1", table);
    let n: i64 = conn.query_row(&sql, params![project_id], |row| row.get(0))?;
    Ok(n.max(0) as usize)
}
