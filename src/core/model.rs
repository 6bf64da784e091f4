//! Tagged types for the in-memory workbook object model: sheets, tables,
//! cell values, and the metadata summaries `wb.inspect` reports.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Visibility {
    Visible,
    Hidden,
    VeryHidden,
}

/// Bounding box of non-empty cells on a sheet. Derived purely from the
/// in-memory model; informational only — it may drift from what Excel
/// would report after a live recalculation, since this system never
/// recalculates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsedRange {
    pub min_row: u32,
    pub min_col: u32,
    pub max_row: u32,
    pub max_col: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetMeta {
    pub name: String,
    pub index: usize,
    pub visibility: Visibility,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_range: Option<UsedRange>,
    pub table_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableColumn {
    pub id: u32,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula_template: Option<String>,
    pub is_formula: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeBounds {
    pub min_row: u32,
    pub min_col: u32,
    pub max_row: u32,
    pub max_col: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMeta {
    pub name: String,
    pub sheet: String,
    pub reference: RangeBounds,
    pub columns: Vec<TableColumn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    pub totals_row: bool,
}

impl TableMeta {
    pub fn column_by_name(&self, name: &str) -> Option<&TableColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column_case_folded(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Number of data rows (the reference's row span minus the header row).
    pub fn row_count(&self) -> u32 {
        self.reference.max_row.saturating_sub(self.reference.min_row)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedRangeMeta {
    pub name: String,
    pub scope: String,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkbookMeta {
    pub path: String,
    pub fingerprint: String,
    pub sheets: Vec<SheetMeta>,
    pub names: Vec<NamedRangeMeta>,
    pub has_macros: bool,
    pub has_external_links: bool,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// A cell's value, tagged by kind. In data-only mode a formula cell reports
/// its last-cached result under one of the non-`Formula` variants (or
/// `Empty` if no cache was saved); in formula mode it reports `Formula`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CellValue {
    Empty,
    Number(f64),
    Bool(bool),
    Text(String),
    Formula(String),
    /// ISO-8601 `YYYY-MM-DD`. Distinguished from `Number` by the cell's
    /// number format at read time (date-shaped format codes).
    Date(String),
}

impl CellValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            CellValue::Empty => "empty",
            CellValue::Number(_) => "number",
            CellValue::Bool(_) => "bool",
            CellValue::Text(_) => "text",
            CellValue::Formula(_) => "formula",
            CellValue::Date(_) => "date",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadMode {
    DataOnly,
    Formula,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Impact {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cells: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<u32>,
}

/// Emitted by every executed operation. Drives dry-run summaries, diff
/// output, and the per-op entries in `changes[]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub op_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<serde_json::Value>,
    pub impact: Impact,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}
