//! Structural value diff between two workbook files, with an opt-in
//! formula-text pass.

use crate::core::errors::CoreError;
use crate::core::io::fingerprint;
use crate::core::model::ReadMode;
use crate::core::reference::cell_address;
use crate::core::workbook::WorkbookContext;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct CellChange {
    #[serde(rename = "ref")]
    pub reference: String,
    pub change_type: String,
    pub before: Option<String>,
    pub after: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffResult {
    pub file_a: String,
    pub file_b: String,
    pub fingerprint_a: String,
    pub fingerprint_b: String,
    pub identical: bool,
    pub sheets_added: Vec<String>,
    pub sheets_removed: Vec<String>,
    pub cell_changes: Vec<CellChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula_changes: Option<Vec<CellChange>>,
    pub total_changes: usize,
}

pub struct DiffOptions {
    pub sheet_filter: Option<String>,
    pub include_formulas: bool,
}

pub fn diff_workbooks(path_a: &Path, path_b: &Path, opts: &DiffOptions) -> Result<DiffResult, CoreError> {
    let ctx_a = WorkbookContext::load(path_a, ReadMode::DataOnly)?;
    let ctx_b = WorkbookContext::load(path_b, ReadMode::DataOnly)?;

    let fp_a = fingerprint(path_a).map_err(|e| CoreError::Internal(e.to_string()))?;
    let fp_b = fingerprint(path_b).map_err(|e| CoreError::Internal(e.to_string()))?;

    let sheets_a: Vec<String> = ctx_a.book().get_sheet_collection().iter().map(|s| s.get_name().to_string()).collect();
    let sheets_b: Vec<String> = ctx_b.book().get_sheet_collection().iter().map(|s| s.get_name().to_string()).collect();

    let sheets_added: Vec<String> = sheets_b.iter().filter(|s| !sheets_a.contains(s)).cloned().collect();
    let sheets_removed: Vec<String> = sheets_a.iter().filter(|s| !sheets_b.contains(s)).cloned().collect();
    let mut sheets_common: Vec<String> = sheets_a.iter().filter(|s| sheets_b.contains(s)).cloned().collect();

    if let Some(filter) = &opts.sheet_filter {
        let in_a = sheets_a.contains(filter);
        let in_b = sheets_b.contains(filter);
        if !in_a || !in_b {
            return Err(CoreError::SheetNotFound(format!(
                "'{filter}' missing in {}",
                if !in_a { path_a.display().to_string() } else { path_b.display().to_string() }
            )));
        }
        sheets_common = vec![filter.clone()];
    }
    sheets_common.sort();

    let mut cell_changes = Vec::new();
    for sheet_name in &sheets_common {
        let ws_a = ctx_a.book().get_sheet_by_name(sheet_name).unwrap();
        let ws_b = ctx_b.book().get_sheet_by_name(sheet_name).unwrap();
        let (max_col_a, max_row_a) = ws_a.get_highest_column_and_row();
        let (max_col_b, max_row_b) = ws_b.get_highest_column_and_row();
        let max_row = max_row_a.max(max_row_b).max(1);
        let max_col = max_col_a.max(max_col_b).max(1);

        for row in 1..=max_row {
            for col in 1..=max_col {
                let addr = cell_address(row, col);
                let val_a = ws_a.get_cell(addr.as_str()).map(|c| c.get_value().to_string());
                let val_b = ws_b.get_cell(addr.as_str()).map(|c| c.get_value().to_string());
                let val_a = val_a.filter(|v| !v.is_empty());
                let val_b = val_b.filter(|v| !v.is_empty());
                if val_a != val_b {
                    let change_type = match (&val_a, &val_b) {
                        (None, Some(_)) => "added",
                        (Some(_), None) => "removed",
                        _ => "modified",
                    };
                    cell_changes.push(CellChange {
                        reference: format!("{sheet_name}!{addr}"),
                        change_type: change_type.to_string(),
                        before: val_a,
                        after: val_b,
                    });
                }
            }
        }
    }

    let formula_changes = if opts.include_formulas {
        let ctx_a_f = WorkbookContext::load(path_a, ReadMode::Formula)?;
        let ctx_b_f = WorkbookContext::load(path_b, ReadMode::Formula)?;
        let mut changes = Vec::new();
        for sheet_name in &sheets_common {
            let ws_a = ctx_a_f.book().get_sheet_by_name(sheet_name).unwrap();
            let ws_b = ctx_b_f.book().get_sheet_by_name(sheet_name).unwrap();
            let (max_col_a, max_row_a) = ws_a.get_highest_column_and_row();
            let (max_col_b, max_row_b) = ws_b.get_highest_column_and_row();
            let max_row = max_row_a.max(max_row_b).max(1);
            let max_col = max_col_a.max(max_col_b).max(1);

            for row in 1..=max_row {
                for col in 1..=max_col {
                    let addr = cell_address(row, col);
                    let cell_a = ws_a.get_cell(addr.as_str());
                    let cell_b = ws_b.get_cell(addr.as_str());
                    let formula_a = cell_a.filter(|c| c.is_formula()).map(|c| c.get_formula().to_string());
                    let formula_b = cell_b.filter(|c| c.is_formula()).map(|c| c.get_formula().to_string());
                    if (formula_a.is_some() || formula_b.is_some()) && formula_a != formula_b {
                        changes.push(CellChange {
                            reference: format!("{sheet_name}!{addr}"),
                            change_type: "formula_modified".to_string(),
                            before: formula_a,
                            after: formula_b,
                        });
                    }
                }
            }
        }
        Some(changes)
    } else {
        None
    };

    let mut total_changes = cell_changes.len() + sheets_added.len() + sheets_removed.len();
    if let Some(f) = &formula_changes {
        total_changes += f.len();
    }

    Ok(DiffResult {
        file_a: path_a.display().to_string(),
        file_b: path_b.display().to_string(),
        fingerprint_a: fp_a.clone(),
        fingerprint_b: fp_b.clone(),
        identical: fp_a == fp_b,
        sheets_added,
        sheets_removed,
        cell_changes,
        formula_changes,
        total_changes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::operations::{self};
    use crate::core::plan::Operation;

    fn workbook_with_value(dir: &Path, name: &str, value: serde_json::Value) -> std::path::PathBuf {
        let path = dir.join(name);
        WorkbookContext::create(&path, &["Sheet1".to_string()], false).unwrap();
        let mut ctx = WorkbookContext::load(&path, ReadMode::Formula).unwrap();
        operations::apply(
            &mut ctx,
            &Operation::CellSet {
                op_id: "op1".into(),
                reference: "Sheet1!A1".into(),
                value,
                cell_type: None,
                force_overwrite_formulas: false,
            },
        )
        .unwrap();
        ctx.save().unwrap();
        path
    }

    #[test]
    fn detects_modified_cell() {
        let dir = tempfile::tempdir().unwrap();
        let a = workbook_with_value(dir.path(), "a.xlsx", serde_json::json!(1));
        let b = workbook_with_value(dir.path(), "b.xlsx", serde_json::json!(2));
        let result = diff_workbooks(&a, &b, &DiffOptions { sheet_filter: None, include_formulas: false }).unwrap();
        assert_eq!(result.cell_changes.len(), 1);
        assert_eq!(result.cell_changes[0].change_type, "modified");
    }

    #[test]
    fn identical_files_report_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let a = workbook_with_value(dir.path(), "a.xlsx", serde_json::json!(1));
        let result = diff_workbooks(&a, &a, &DiffOptions { sheet_filter: None, include_formulas: false }).unwrap();
        assert!(result.identical);
        assert_eq!(result.total_changes, 0);
    }
}
