//! Owns the in-memory OOXML object model for the lifetime of one
//! invocation: load/create/save and the sheet/table/named-range lookups the
//! rest of the core builds on.

use crate::core::errors::CoreError;
use crate::core::io::fingerprint;
use crate::core::model::{
    NamedRangeMeta, ReadMode, RangeBounds, SheetMeta, TableColumn, TableMeta, UsedRange, Visibility,
    WorkbookMeta,
};
use std::path::{Path, PathBuf};
use umya_spreadsheet::Spreadsheet;

/// Owns the workbook's in-memory model. Sheets and tables are reached
/// through the context rather than held directly, mirroring the spec's
/// arena-by-index-or-name ownership model.
pub struct WorkbookContext {
    path: PathBuf,
    book: Spreadsheet,
    mode: ReadMode,
    fingerprint: String,
}

impl WorkbookContext {
    /// Open an existing workbook. `ERR_WORKBOOK_NOT_FOUND` if the path is
    /// absent, `ERR_WORKBOOK_CORRUPT` if umya cannot parse it.
    pub fn load(path: &Path, mode: ReadMode) -> Result<Self, CoreError> {
        if !path.exists() {
            return Err(CoreError::WorkbookNotFound(path.display().to_string()));
        }
        let book = umya_spreadsheet::reader::xlsx::read(path)
            .map_err(|e| CoreError::WorkbookCorrupt(format!("{}: {e}", path.display())))?;
        let fp = fingerprint(path)
            .map_err(|e| CoreError::WorkbookCorrupt(format!("cannot fingerprint {}: {e}", path.display())))?;
        Ok(WorkbookContext { path: path.to_path_buf(), book, mode, fingerprint: fp })
    }

    /// Write a minimal workbook with the given ordered sheet names (at
    /// least one) and close it. `force=false` refuses to clobber an
    /// existing file.
    pub fn create(path: &Path, sheet_names: &[String], force: bool) -> Result<(), CoreError> {
        if path.exists() && !force {
            return Err(CoreError::FileExists(path.display().to_string()));
        }
        let names: Vec<String> = if sheet_names.is_empty() {
            vec!["Sheet1".to_string()]
        } else {
            sheet_names.to_vec()
        };

        let mut book = umya_spreadsheet::new_file_empty_worksheet();
        for (i, name) in names.iter().enumerate() {
            if i == 0 {
                book.new_sheet(name.clone()).map_err(|e| CoreError::Internal(e.to_string()))?;
            } else {
                book.new_sheet(name.clone()).map_err(|e| CoreError::Internal(e.to_string()))?;
            }
        }
        umya_spreadsheet::writer::xlsx::write(&book, path)
            .map_err(|e| CoreError::Internal(format!("failed to write {}: {e}", path.display())))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> ReadMode {
        self.mode
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn book(&self) -> &Spreadsheet {
        &self.book
    }

    pub fn book_mut(&mut self) -> &mut Spreadsheet {
        &mut self.book
    }

    /// Serialize the model and persist it via atomic write, then
    /// re-compute and store the fingerprint. Must be called only while the
    /// caller holds the workbook lock.
    pub fn save(&mut self) -> Result<String, CoreError> {
        umya_spreadsheet::writer::xlsx::write(&self.book, &self.path)
            .map_err(|e| CoreError::Internal(format!("failed to save {}: {e}", self.path.display())))?;
        let fp = fingerprint(&self.path)
            .map_err(|e| CoreError::Internal(format!("cannot fingerprint after save: {e}")))?;
        self.fingerprint = fp.clone();
        Ok(fp)
    }

    /// Case-sensitive linear scan over every sheet for a table with this
    /// display name. Table-name uniqueness across the workbook is an
    /// invariant this system never has to reconcile — it never creates two
    /// tables with the same name.
    pub fn find_table(&self, name: &str) -> Option<(String, TableMeta)> {
        for sheet in self.book.get_sheet_collection() {
            for table in sheet.get_tables() {
                if table.get_name() == name {
                    return Some((sheet.get_name().to_string(), table_meta(sheet, table)));
                }
            }
        }
        None
    }

    pub fn list_sheets(&self) -> Vec<SheetMeta> {
        self.book
            .get_sheet_collection()
            .iter()
            .enumerate()
            .map(|(idx, sheet)| sheet_meta(sheet, idx))
            .collect()
    }

    pub fn list_tables(&self) -> Vec<TableMeta> {
        self.book
            .get_sheet_collection()
            .iter()
            .flat_map(|sheet| sheet.get_tables().iter().map(move |t| table_meta(sheet, t)))
            .collect()
    }

    pub fn has_macros(&self) -> bool {
        self.path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("xlsm"))
            .unwrap_or(false)
    }

    pub fn has_external_links(&self) -> bool {
        !self.book.get_defined_names().is_empty()
            && self
                .book
                .get_defined_names()
                .iter()
                .any(|n| n.get_address().contains('['))
    }

    pub fn workbook_meta(&self) -> WorkbookMeta {
        let mut warnings = Vec::new();
        if self.has_macros() {
            warnings.push("WARN_MACROS_PRESENT: macro streams are preserved but never executed".to_string());
        }
        if self.has_external_links() {
            warnings.push("WARN_EXTERNAL_LINKS_PRESENT".to_string());
        }

        let names = self
            .book
            .get_defined_names()
            .iter()
            .map(|n| NamedRangeMeta {
                name: n.get_name().to_string(),
                scope: "workbook".to_string(),
                reference: n.get_address().to_string(),
            })
            .collect();

        WorkbookMeta {
            path: self.path.display().to_string(),
            fingerprint: self.fingerprint.clone(),
            sheets: self.list_sheets(),
            names,
            has_macros: self.has_macros(),
            has_external_links: self.has_external_links(),
            warnings,
        }
    }
}

fn cell_to_row_col(addr: &str) -> (u32, u32) {
    match crate::core::reference::parse_reference(addr) {
        Ok(crate::core::reference::Reference::Cell { row, col, .. }) => (row, col),
        _ => (1, 1),
    }
}

fn sheet_meta(sheet: &umya_spreadsheet::Worksheet, index: usize) -> SheetMeta {
    let visibility = match sheet.get_sheet_state() {
        s if s == "hidden" => Visibility::Hidden,
        s if s == "veryHidden" => Visibility::VeryHidden,
        _ => Visibility::Visible,
    };

    let (max_col, max_row) = sheet.get_highest_column_and_row();
    let used_range = if max_col > 0 && max_row > 0 {
        Some(UsedRange { min_row: 1, min_col: 1, max_row, max_col })
    } else {
        None
    };

    SheetMeta {
        name: sheet.get_name().to_string(),
        index,
        visibility,
        used_range,
        table_count: sheet.get_tables().len(),
    }
}

/// Builds `TableColumn.formula_template`/`is_formula` by reading the first
/// data row (the row right below the header) for each column — a table
/// created by this system or by Excel fills a formula column uniformly down
/// every data row, so that row is a representative sample.
fn table_meta(sheet: &umya_spreadsheet::Worksheet, table: &umya_spreadsheet::structs::Table) -> TableMeta {
    let (start, end) = table.get_area();
    let (min_row, min_col) = cell_to_row_col(start);
    let (max_row, max_col) = cell_to_row_col(end);
    let first_data_row = min_row + 1;

    let columns = table
        .get_table_column_collection()
        .iter()
        .enumerate()
        .map(|(i, col)| {
            let addr = crate::core::reference::cell_address(first_data_row, min_col + i as u32);
            let (formula_template, is_formula) = match sheet.get_cell(addr.as_str()) {
                Some(cell) if cell.is_formula() => (Some(cell.get_formula().to_string()), true),
                _ => (None, false),
            };
            TableColumn { id: (i + 1) as u32, name: col.get_name().to_string(), formula_template, is_formula }
        })
        .collect();

    TableMeta {
        name: table.get_name().to_string(),
        sheet: sheet.get_name().to_string(),
        reference: RangeBounds { min_row, min_col, max_row, max_col },
        columns,
        style: None,
        totals_row: *table.get_totals_row_shown(),
    }
}
