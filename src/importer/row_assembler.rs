// ==========================================
// Precast tracking backend - row assembler
// ==========================================
// RawRow → ElementTypeDraft
// - fixed attributes parsed and range-checked
// - stage / drawing / hierarchy / BOM cells resolved through the
//   reference resolver; unresolved labels drop the cell
// - derived: density, version code, total_count_element
// ==========================================

use crate::domain::{
    BomLine, CellFlag, Dimensions, DrawingDraft, ElementTypeDraft, HierarchyQuantityDraft,
    RefCategory, INITIAL_VERSION_CODE,
};
use crate::domain::element_type::{MAX_DIMENSION, MAX_HIERARCHY_QUANTITY};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::reference_resolver::ReferenceResolver;
use crate::importer::tabular_reader::{ColumnLayout, FixedColumn, RawRow};
use rusqlite::Connection;

pub struct RowAssembler<'a> {
    layout: ColumnLayout,
    resolver: &'a ReferenceResolver,
    created_by: Option<i64>,
}

impl<'a> RowAssembler<'a> {
    pub fn new(layout: ColumnLayout, resolver: &'a ReferenceResolver, created_by: Option<i64>) -> Self {
        Self {
            layout,
            resolver,
            created_by,
        }
    }

    /// Assemble one row.
    ///
    /// # Returns
    /// - Ok(draft)
    /// - Err(InvalidRow): empty code, a dimension that is not a number in [0, 1e6],
    ///   or a hierarchy quantity above `MAX_HIERARCHY_QUANTITY`
    /// - Err(Database / FatalDatabase): reference lookup failed
    pub fn assemble(&self, conn: &Connection, row: &RawRow) -> ImportResult<ElementTypeDraft> {
        let code = row.cell(FixedColumn::ElementType.index()).to_string();
        if code.is_empty() {
            return Err(invalid(row, "element_type code is empty"));
        }
        let name = match row.cell(FixedColumn::ElementTypeName.index()) {
            "" => code.clone(),
            name => name.to_string(),
        };

        let dimensions = Dimensions {
            height: dimension(row, FixedColumn::Height)?,
            length: dimension(row, FixedColumn::Length)?,
            thickness: dimension(row, FixedColumn::Thickness)?,
            mass: dimension(row, FixedColumn::Mass)?,
            volume: dimension(row, FixedColumn::Volume)?,
            area: dimension(row, FixedColumn::Area)?,
            width: dimension(row, FixedColumn::Width)?,
        };

        let stage_path = self.stage_path(conn, row)?;
        let drawings = self.drawings(conn, row)?;
        let hierarchy_quantities = self.hierarchy_quantities(conn, row)?;
        let bom_lines = self.bom_lines(conn, row)?;

        Ok(ElementTypeDraft {
            project_id: self.resolver.project_id(),
            row_number: row.row_number,
            code,
            name,
            density: dimensions.density(),
            dimensions,
            version_code: INITIAL_VERSION_CODE.to_string(),
            stage_path,
            drawings,
            total_count_element: hierarchy_quantities.len() as i64,
            hierarchy_quantities,
            bom_lines,
            created_by: self.created_by,
        })
    }

    fn stage_path(&self, conn: &Connection, row: &RawRow) -> ImportResult<Vec<i64>> {
        let mut path = Vec::new();
        for idx in self.layout.stage_columns() {
            match CellFlag::parse(row.cell(idx)) {
                CellFlag::Yes => {}
                CellFlag::No => continue,
                CellFlag::Unparsed => {
                    tracing::debug!(
                        row_number = row.row_number,
                        value = row.cell(idx),
                        "stage flag not recognised, treated as not selected"
                    );
                    continue;
                }
            }
            let Some(label) = row.header.get(idx) else { continue };
            if let Some(stage) = self.resolver.try_resolve(conn, RefCategory::Stage, label)? {
                if !path.contains(&stage.id) {
                    path.push(stage.id);
                }
            }
        }
        Ok(path)
    }

    fn drawings(&self, conn: &Connection, row: &RawRow) -> ImportResult<Vec<DrawingDraft>> {
        let mut drawings: Vec<DrawingDraft> = Vec::new();
        for idx in self.layout.drawing_columns() {
            let file = row.cell(idx);
            if file.is_empty() {
                continue;
            }
            let Some(label) = row.header.get(idx) else { continue };
            if let Some(dt) = self.resolver.try_resolve(conn, RefCategory::DrawingType, label)? {
                drawings.push(DrawingDraft {
                    drawing_type_id: dt.id,
                    drawing_type_name: label.clone(),
                    file: file.to_string(),
                });
            }
        }
        Ok(drawings)
    }

    fn hierarchy_quantities(
        &self,
        conn: &Connection,
        row: &RawRow,
    ) -> ImportResult<Vec<HierarchyQuantityDraft>> {
        let mut rows: Vec<HierarchyQuantityDraft> = Vec::new();
        for idx in self.layout.hierarchy_columns() {
            let Some(quantity) = parse_quantity(row.cell(idx)) else { continue };
            let Some(label) = row.header.get(idx) else { continue };
            if quantity > MAX_HIERARCHY_QUANTITY {
                return Err(invalid(
                    row,
                    format!(
                        "quantity for '{}' exceeds {}: {}",
                        label,
                        MAX_HIERARCHY_QUANTITY,
                        row.cell(idx)
                    ),
                ));
            }
            let Some(node) = self.resolver.try_resolve(conn, RefCategory::Hierarchy, label)? else {
                continue;
            };
            // one row per (element_type, hierarchy); first column wins
            if rows.iter().any(|r| r.hierarchy_id == node.id) {
                continue;
            }
            rows.push(HierarchyQuantityDraft {
                hierarchy_id: node.id,
                path: label.clone(),
                quantity,
                naming_convention: node.detail.unwrap_or_default(),
            });
        }
        Ok(rows)
    }

    fn bom_lines(&self, conn: &Connection, row: &RawRow) -> ImportResult<Vec<BomLine>> {
        let mut lines = Vec::new();
        for idx in self.layout.bom_columns(row.header.len()) {
            let Some(quantity) = parse_bom_quantity(row.cell(idx)) else { continue };
            let Some(label) = row.header.get(idx) else { continue };
            if let Some(product) = self.resolver.try_resolve(conn, RefCategory::BomProduct, label)? {
                lines.push(BomLine {
                    product_id: product.id,
                    product_name: product.detail.unwrap_or_else(|| label.clone()),
                    quantity,
                });
            }
        }
        Ok(lines)
    }
}

fn invalid(row: &RawRow, message: impl Into<String>) -> ImportError {
    ImportError::InvalidRow {
        row: row.row_number,
        message: message.into(),
    }
}

/// Empty cells read as 0.
fn dimension(row: &RawRow, column: FixedColumn) -> ImportResult<f64> {
    let raw = row.cell(column.index());
    if raw.is_empty() {
        return Ok(0.0);
    }
    let value: f64 = raw
        .parse()
        .map_err(|_| invalid(row, format!("{} is not a number: '{}'", column.label(), raw)))?;
    if !value.is_finite() || value < 0.0 {
        return Err(invalid(row, format!("{} must be a non-negative number: '{}'", column.label(), raw)));
    }
    if value > MAX_DIMENSION {
        return Err(invalid(row, format!("{} exceeds 1e6: {}", column.label(), raw)));
    }
    Ok(value)
}

/// Positive integer quantity; zero, negative and unparseable cells are skipped.
fn parse_quantity(raw: &str) -> Option<i64> {
    if raw.is_empty() {
        return None;
    }
    let value = match raw.parse::<i64>() {
        Ok(v) => v,
        // spreadsheets hand integers over as "2.0"
        Err(_) => {
            let f: f64 = raw.parse().ok()?;
            if !f.is_finite() || f.fract() != 0.0 || f > i64::MAX as f64 {
                return None;
            }
            f as i64
        }
    };
    (value > 0).then_some(value)
}

/// Positive float quantity; zero, negative and unparseable cells are skipped.
fn parse_bom_quantity(raw: &str) -> Option<f64> {
    let value: f64 = raw.parse().ok()?;
    (value.is_finite() && value > 0.0).then_some(value)
}
