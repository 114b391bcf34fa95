// ==========================================
// Precast tracking backend - tabular reader
// ==========================================
// Supports: CSV (.csv) / spreadsheet (.xlsx/.xlsm/.xls/.ods)
// Row 1 is the header; on spreadsheets an emitted sub-header row 2 is
// recognised and skipped. Rows are yielded lazily, blank rows dropped.
//
// Column layout (S, D, H from the project dictionaries):
//   1..10                  fixed attributes
//   11..10+S               stage flags
//   ..10+S+D               drawing files
//   ..10+S+D+H             hierarchy quantities
//   remaining              BOM quantities
// ==========================================

use crate::domain::DictionarySizes;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::header_decode::decode_header;
use calamine::{open_workbook_auto, Data, Range, Reader};
use std::fs::File;
use std::ops::Range as Span;
use std::path::Path;
use std::sync::Arc;

/// Number of fixed attribute columns at the start of every row.
pub const FIXED_COLUMN_COUNT: usize = 10;

// ==========================================
// Fixed columns
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedColumn {
    ElementType,
    ElementTypeName,
    Height,
    Length,
    Thickness,
    Mass,
    Volume,
    Area,
    Width,
    ElementTypeVersion,
}

impl FixedColumn {
    pub const ALL: [FixedColumn; FIXED_COLUMN_COUNT] = [
        FixedColumn::ElementType,
        FixedColumn::ElementTypeName,
        FixedColumn::Height,
        FixedColumn::Length,
        FixedColumn::Thickness,
        FixedColumn::Mass,
        FixedColumn::Volume,
        FixedColumn::Area,
        FixedColumn::Width,
        FixedColumn::ElementTypeVersion,
    ];

    /// Zero-based column index.
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Header label written by the template emitter.
    pub fn label(&self) -> &'static str {
        match self {
            FixedColumn::ElementType => "element_type",
            FixedColumn::ElementTypeName => "element_type_name",
            FixedColumn::Height => "height",
            FixedColumn::Length => "length",
            FixedColumn::Thickness => "thickness",
            FixedColumn::Mass => "mass",
            FixedColumn::Volume => "volume",
            FixedColumn::Area => "area",
            FixedColumn::Width => "width",
            FixedColumn::ElementTypeVersion => "element_type_version",
        }
    }

    /// Sub-header hint written on row 2 of the spreadsheet template.
    pub fn sub_header(&self) -> &'static str {
        match self {
            FixedColumn::ElementType => "[code]",
            FixedColumn::ElementTypeName => "[name]",
            FixedColumn::Height | FixedColumn::Length | FixedColumn::Thickness => "[mm]",
            FixedColumn::Width => "[mm]",
            FixedColumn::Mass => "[kg]",
            FixedColumn::Volume => "[m3]",
            FixedColumn::Area => "[m2]",
            FixedColumn::ElementTypeVersion => "[version]",
        }
    }
}

// ==========================================
// Column classification
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Fixed(FixedColumn),
    StageFlag,
    DrawingFile,
    HierarchyQuantity,
    BomQuantity,
}

impl ColumnKind {
    /// Sub-header hint for the column (row 2 of the spreadsheet template).
    pub fn sub_header(&self) -> &'static str {
        match self {
            ColumnKind::Fixed(col) => col.sub_header(),
            ColumnKind::StageFlag => "[yes/1]",
            ColumnKind::DrawingFile => "[file]",
            ColumnKind::HierarchyQuantity => "[qty]",
            ColumnKind::BomQuantity => "[bom qty]",
        }
    }
}

/// Layout of one file, fixed at reader initialisation from the
/// project's dictionary sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    pub sizes: DictionarySizes,
}

impl ColumnLayout {
    pub fn new(sizes: DictionarySizes) -> Self {
        Self { sizes }
    }

    pub fn stage_columns(&self) -> Span<usize> {
        let start = FIXED_COLUMN_COUNT;
        start..start + self.sizes.stages
    }

    pub fn drawing_columns(&self) -> Span<usize> {
        let start = self.stage_columns().end;
        start..start + self.sizes.drawing_types
    }

    pub fn hierarchy_columns(&self) -> Span<usize> {
        let start = self.drawing_columns().end;
        start..start + self.sizes.hierarchy_nodes
    }

    /// BOM columns run to the end of the header, however wide it is.
    pub fn bom_columns(&self, header_len: usize) -> Span<usize> {
        let start = self.hierarchy_columns().end;
        start..header_len.max(start)
    }

    /// Width of the template for this layout.
    pub fn expected_width(&self) -> usize {
        self.hierarchy_columns().end + self.sizes.bom_products
    }

    /// Classify a zero-based column index.
    pub fn classify(&self, index: usize) -> ColumnKind {
        if index < FIXED_COLUMN_COUNT {
            return ColumnKind::Fixed(FixedColumn::ALL[index]);
        }
        if self.stage_columns().contains(&index) {
            ColumnKind::StageFlag
        } else if self.drawing_columns().contains(&index) {
            ColumnKind::DrawingFile
        } else if self.hierarchy_columns().contains(&index) {
            ColumnKind::HierarchyQuantity
        } else {
            ColumnKind::BomQuantity
        }
    }
}

// ==========================================
// Format detection
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabularFormat {
    Csv,
    Spreadsheet,
}

impl TabularFormat {
    /// Pick the format from the file extension (case-insensitive).
    pub fn from_path(path: &Path) -> ImportResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "csv" => Ok(TabularFormat::Csv),
            "xlsx" | "xlsm" | "xls" | "ods" => Ok(TabularFormat::Spreadsheet),
            _ => Err(ImportError::UnsupportedFormat(if ext.is_empty() {
                path.display().to_string()
            } else {
                ext
            })),
        }
    }
}

// ==========================================
// RawRow
// ==========================================
#[derive(Debug, Clone)]
pub struct RawRow {
    /// 1-based row number in the source file (the header is row 1)
    pub row_number: usize,
    pub header: Arc<Vec<String>>,
    pub values: Vec<String>,
}

impl RawRow {
    /// Trimmed cell value; missing trailing cells read as empty.
    pub fn cell(&self, index: usize) -> &str {
        self.values.get(index).map(|v| v.trim()).unwrap_or("")
    }

    pub fn is_blank(&self) -> bool {
        self.values.iter().all(|v| v.trim().is_empty())
    }
}

// ==========================================
// TabularReader
// ==========================================
enum RowSource {
    Csv(csv::StringRecordsIntoIter<File>),
    Sheet { range: Range<Data>, col_offset: usize, next: usize },
}

/// Lazy, finite row stream over one staged file.
///
/// Restartable only by opening the file again.
pub struct TabularReader {
    format: TabularFormat,
    header: Arc<Vec<String>>,
    source: RowSource,
    // row number of the next physical row to read
    row_number: usize,
}

impl TabularReader {
    /// Open a file and read its header row.
    ///
    /// # Returns
    /// - Err(FileNotFound / UnsupportedFormat / ...ParseError / MissingHeader)
    pub fn open(path: &Path) -> ImportResult<Self> {
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }

        match TabularFormat::from_path(path)? {
            TabularFormat::Csv => Self::open_csv(path),
            TabularFormat::Spreadsheet => Self::open_sheet(path),
        }
    }

    fn open_csv(path: &Path) -> ImportResult<Self> {
        let file = File::open(path)?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // short rows are padded, long rows kept
            .from_reader(file);

        let header: Vec<String> = reader.headers()?.iter().map(normalise_label).collect();
        if header.iter().all(|h| h.is_empty()) {
            return Err(ImportError::MissingHeader);
        }

        Ok(Self {
            format: TabularFormat::Csv,
            header: Arc::new(header),
            source: RowSource::Csv(reader.into_records()),
            row_number: 2,
        })
    }

    fn open_sheet(path: &Path) -> ImportResult<Self> {
        let mut workbook = open_workbook_auto(path)?;
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ImportError::ExcelParseError("workbook has no worksheet".to_string()))?;
        let range = workbook.worksheet_range(&sheet_name)?;

        // Ranges start at the first non-empty cell; keep column positions absolute
        let (start_row, start_col) = range.start().unwrap_or((0, 0));
        let col_offset = start_col as usize;
        if start_row != 0 || range.height() == 0 {
            return Err(ImportError::MissingHeader);
        }

        let header_cells = sheet_row(&range, col_offset, 0);
        let header: Vec<String> = header_cells.iter().map(|c| normalise_label(c)).collect();
        if header.iter().all(|h| h.is_empty()) {
            return Err(ImportError::MissingHeader);
        }

        let mut next = 1;
        if range.height() > 1 && is_sub_header_row(&sheet_row(&range, col_offset, 1)) {
            next = 2;
        }

        Ok(Self {
            format: TabularFormat::Spreadsheet,
            header: Arc::new(header),
            source: RowSource::Sheet {
                range,
                col_offset,
                next,
            },
            row_number: next + 1,
        })
    }

    pub fn format(&self) -> TabularFormat {
        self.format
    }

    /// Decoded header labels, shared by every yielded row.
    pub fn header(&self) -> &Arc<Vec<String>> {
        &self.header
    }

    /// Next physical row with its source row number.
    fn next_physical(&mut self) -> Option<(usize, ImportResult<Vec<String>>)> {
        let fallback = self.row_number;
        match &mut self.source {
            RowSource::Csv(records) => records.next().map(|record| match record {
                Ok(r) => {
                    let row_number = r.position().map_or(fallback, |p| p.line() as usize);
                    (row_number, Ok(r.iter().map(|v| v.to_string()).collect()))
                }
                Err(e) => {
                    let row_number = e.position().map_or(fallback, |p| p.line() as usize);
                    (row_number, Err(record_error(e, row_number)))
                }
            }),
            RowSource::Sheet {
                range,
                col_offset,
                next,
            } => {
                if *next >= range.height() {
                    return None;
                }
                let row = sheet_row(range, *col_offset, *next);
                *next += 1;
                Some((fallback, Ok(row)))
            }
        }
    }
}

impl Iterator for TabularReader {
    type Item = ImportResult<RawRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (row_number, values) = self.next_physical()?;
            self.row_number = row_number + 1;
            let values = match values {
                Ok(values) => values,
                Err(e) => return Some(Err(e)),
            };
            let row = RawRow {
                row_number,
                header: self.header.clone(),
                values,
            };
            if row.is_blank() {
                continue;
            }
            return Some(Ok(row));
        }
    }
}

/// A record the CSV reader could not decode is a bad row; an I/O failure
/// means the source itself is unreadable.
fn record_error(err: csv::Error, row_number: usize) -> ImportError {
    if matches!(err.kind(), csv::ErrorKind::Io(_)) {
        return ImportError::from(err);
    }
    let message = match err.kind() {
        csv::ErrorKind::Utf8 { err, .. } => format!("invalid UTF-8 in field {}", err.field() + 1),
        _ => format!("unreadable record: {}", err),
    };
    ImportError::InvalidRow {
        row: row_number,
        message,
    }
}

fn normalise_label(raw: &str) -> String {
    decode_header(raw.trim_start_matches('\u{feff}'))
}

fn sheet_row(range: &Range<Data>, col_offset: usize, row: usize) -> Vec<String> {
    let mut cells = vec![String::new(); col_offset];
    for col in 0..range.width() {
        let value = match range.get((row, col)) {
            Some(Data::Empty) | None => String::new(),
            Some(cell) => cell.to_string(),
        };
        cells.push(value);
    }
    // trailing empties carry no information
    while cells.last().map(|c| c.trim().is_empty()).unwrap_or(false) {
        cells.pop();
    }
    cells
}

/// True when every non-empty cell is one of the template's sub-header hints.
fn is_sub_header_row(cells: &[String]) -> bool {
    let mut seen_any = false;
    for cell in cells.iter().map(|c| c.trim()).filter(|c| !c.is_empty()) {
        if !is_sub_header_label(cell) {
            return false;
        }
        seen_any = true;
    }
    seen_any
}

fn is_sub_header_label(cell: &str) -> bool {
    FixedColumn::ALL.iter().any(|c| c.sub_header() == cell)
        || [
            ColumnKind::StageFlag,
            ColumnKind::DrawingFile,
            ColumnKind::HierarchyQuantity,
            ColumnKind::BomQuantity,
        ]
        .iter()
        .any(|k| k.sub_header() == cell)
}
