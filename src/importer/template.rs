// ==========================================
// Precast tracking backend - import template emitter
// ==========================================
// Produces the file layout the tabular reader expects:
//   sheet "element_types": header row + sub-header row
//   sheet "summary":       section, first/last column, count
// plus a header-only CSV variant. Both come from one TemplateLayout,
// so column order always matches ColumnLayout.
// ==========================================

use crate::domain::{DictionarySizes, RefCategory};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::reference_resolver::ReferenceResolver;
use crate::importer::tabular_reader::{ColumnLayout, FixedColumn};
use rusqlite::Connection;
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use serde::Serialize;

pub const DATA_SHEET_NAME: &str = "element_types";
pub const SUMMARY_SHEET_NAME: &str = "summary";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateSection {
    pub name: &'static str,
    /// Spreadsheet column letters, None for an empty section
    pub first_column: Option<String>,
    pub last_column: Option<String>,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateLayout {
    pub stages: Vec<String>,
    pub drawing_types: Vec<String>,
    pub hierarchy_paths: Vec<String>,
    pub bom_products: Vec<String>,
}

impl TemplateLayout {
    /// Read the project's dictionaries in template order.
    pub fn load(conn: &Connection, resolver: &ReferenceResolver) -> ImportResult<Self> {
        Ok(Self {
            stages: resolver.labels(conn, RefCategory::Stage)?,
            drawing_types: resolver.labels(conn, RefCategory::DrawingType)?,
            hierarchy_paths: resolver.labels(conn, RefCategory::Hierarchy)?,
            bom_products: resolver.labels(conn, RefCategory::BomProduct)?,
        })
    }

    pub fn sizes(&self) -> DictionarySizes {
        DictionarySizes {
            stages: self.stages.len(),
            drawing_types: self.drawing_types.len(),
            hierarchy_nodes: self.hierarchy_paths.len(),
            bom_products: self.bom_products.len(),
        }
    }

    pub fn column_layout(&self) -> ColumnLayout {
        ColumnLayout::new(self.sizes())
    }

    /// Header row: fixed columns, stages, drawing types, hierarchy paths, BOM name_ids.
    pub fn header(&self) -> Vec<String> {
        FixedColumn::ALL
            .iter()
            .map(|c| c.label().to_string())
            .chain(self.stages.iter().cloned())
            .chain(self.drawing_types.iter().cloned())
            .chain(self.hierarchy_paths.iter().cloned())
            .chain(self.bom_products.iter().cloned())
            .collect()
    }

    /// Sub-header row, one hint per header column.
    pub fn sub_header(&self) -> Vec<&'static str> {
        let layout = self.column_layout();
        (0..layout.expected_width())
            .map(|idx| layout.classify(idx).sub_header())
            .collect()
    }

    pub fn sections(&self) -> Vec<TemplateSection> {
        let layout = self.column_layout();
        let width = layout.expected_width();
        let section = |name, range: std::ops::Range<usize>| TemplateSection {
            name,
            first_column: (!range.is_empty()).then(|| column_letter(range.start)),
            last_column: (!range.is_empty()).then(|| column_letter(range.end - 1)),
            count: range.len(),
        };

        vec![
            section("fixed_attributes", 0..FixedColumn::ALL.len()),
            section("stages", layout.stage_columns()),
            section("drawing_types", layout.drawing_columns()),
            section("hierarchy", layout.hierarchy_columns()),
            section("bom_products", layout.bom_columns(width)),
        ]
    }

    /// Spreadsheet variant.
    pub fn to_xlsx(&self) -> ImportResult<Vec<u8>> {
        self.write_xlsx().map_err(template_error)
    }

    fn write_xlsx(&self) -> Result<Vec<u8>, XlsxError> {
        let mut workbook = Workbook::new();
        let bold = Format::new().set_bold();
        let hint = Format::new().set_italic();

        let sheet = workbook.add_worksheet();
        sheet.set_name(DATA_SHEET_NAME)?;
        for (col, label) in self.header().iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, label, &bold)?;
        }
        for (col, label) in self.sub_header().iter().enumerate() {
            sheet.write_string_with_format(1, col as u16, *label, &hint)?;
        }

        let summary = workbook.add_worksheet();
        summary.set_name(SUMMARY_SHEET_NAME)?;
        for (col, label) in ["section", "first_column", "last_column", "count"]
            .iter()
            .enumerate()
        {
            summary.write_string_with_format(0, col as u16, *label, &bold)?;
        }
        for (idx, section) in self.sections().iter().enumerate() {
            let row = idx as u32 + 1;
            summary.write_string(row, 0, section.name)?;
            summary.write_string(row, 1, section.first_column.as_deref().unwrap_or(""))?;
            summary.write_string(row, 2, section.last_column.as_deref().unwrap_or(""))?;
            summary.write_number(row, 3, section.count as f64)?;
        }

        workbook.save_to_buffer()
    }

    /// Header-only CSV variant.
    pub fn to_csv(&self) -> ImportResult<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(self.header())?;
        writer
            .into_inner()
            .map_err(|e| ImportError::InternalError(format!("template CSV flush failed: {}", e)))
    }
}

fn template_error(err: XlsxError) -> ImportError {
    ImportError::InternalError(format!("template generation failed: {}", err))
}

/// Zero-based column index → spreadsheet letters (0 → A, 26 → AA).
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::tabular_reader::{ColumnKind, TabularReader};
    use std::io::Write;

    fn layout() -> TemplateLayout {
        TemplateLayout {
            stages: vec!["Cast".into(), "Cure".into()],
            drawing_types: vec!["Plan".into(), "Section".into()],
            hierarchy_paths: vec!["T1/F1".into(), "T1/F2".into()],
            bom_products: vec!["Cement_OPC".into(), "Steel_Fe500".into()],
        }
    }

    #[test]
    fn test_column_letters() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(9), "J");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(701), "ZZ");
        assert_eq!(column_letter(702), "AAA");
    }

    #[test]
    fn test_header_matches_reader_layout() {
        let template = layout();
        let header = template.header();
        let columns = template.column_layout();

        assert_eq!(header.len(), columns.expected_width());
        assert_eq!(header[0], "element_type");
        assert_eq!(header[9], "element_type_version");
        assert_eq!(columns.classify(10), ColumnKind::StageFlag);
        assert_eq!(header[10], "Cast");
        assert_eq!(columns.classify(12), ColumnKind::DrawingFile);
        assert_eq!(header[12], "Plan");
        assert_eq!(columns.classify(14), ColumnKind::HierarchyQuantity);
        assert_eq!(header[15], "T1/F2");
        assert_eq!(columns.classify(17), ColumnKind::BomQuantity);
        assert_eq!(header[17], "Steel_Fe500");
        assert_eq!(template.sub_header().len(), header.len());
    }

    #[test]
    fn test_summary_sections() {
        let sections = layout().sections();
        assert_eq!(sections.len(), 5);
        assert_eq!(sections[0].first_column.as_deref(), Some("A"));
        assert_eq!(sections[0].last_column.as_deref(), Some("J"));
        assert_eq!(sections[1].first_column.as_deref(), Some("K"));
        assert_eq!(sections[4].last_column.as_deref(), Some("R"));
        assert_eq!(sections.iter().map(|s| s.count).sum::<usize>(), 18);

        let empty = TemplateLayout::default().sections();
        assert_eq!(empty[1].count, 0);
        assert!(empty[1].first_column.is_none());
    }

    #[test]
    fn test_xlsx_template_reads_back_without_rows() {
        let template = layout();
        let bytes = template.to_xlsx().unwrap();

        let mut file = tempfile::Builder::new().suffix(".xlsx").tempfile().unwrap();
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();

        let mut reader = TabularReader::open(file.path()).unwrap();
        assert_eq!(reader.header().as_slice(), template.header().as_slice());
        // sub-header row is recognised and skipped
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_csv_template_is_header_only() {
        let bytes = layout().to_csv().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with("element_type,element_type_name,height"));
        assert!(text.trim_end().ends_with("Cement_OPC,Steel_Fe500"));
    }
}
