// ==========================================
// Precast tracking backend - reference dictionaries
// ==========================================
// Project-local dictionaries consulted during import:
//   drawing_types  (by name)
//   project_stages (by name, ordered by stage_order)
//   precast        (hierarchy nodes, by path)
//   bom_products   (by name_id)
// The import never inserts, updates or deletes these rows.
// ==========================================

use serde::{Deserialize, Serialize};

/// A resolved reference: the foreign key plus the one attribute the
/// import needs from the row (BOM product name, hierarchy naming convention).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefEntry {
    pub id: i64,
    pub detail: Option<String>,
}

/// Dictionary sizes S, D, H, B used for column classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionarySizes {
    pub stages: usize,
    pub drawing_types: usize,
    pub hierarchy_nodes: usize,
    pub bom_products: usize,
}

/// BOM column label: `product_name + '_' + product_type`, no further sanitation.
pub fn bom_name_id(product_name: &str, product_type: &str) -> String {
    format!("{}_{}", product_name, product_type)
}
