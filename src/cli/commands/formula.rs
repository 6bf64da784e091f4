use crate::cli::commands::{apply_single, to_value};
use crate::core::errors::CoreError;
use crate::core::formula_lint;
use crate::core::model::ReadMode;
use crate::core::plan::Operation;
use crate::core::workbook::WorkbookContext;
use serde_json::Value;
use std::path::Path;

#[allow(clippy::too_many_arguments)]
pub fn set(
    file: &Path,
    reference: String,
    formula: String,
    fill_mode: Option<String>,
    force_overwrite_values: bool,
    force_overwrite_formulas: bool,
    dry_run: bool,
    backup: bool,
    lock_timeout_secs: Option<u64>,
) -> Result<Value, CoreError> {
    let op = Operation::FormulaSet {
        op_id: "op1".into(),
        reference,
        formula,
        fill_mode,
        force_overwrite_values,
        force_overwrite_formulas,
    };
    to_value(&apply_single(file, op, dry_run, backup, lock_timeout_secs)?)
}

pub fn find(file: &Path, pattern: &str, sheet: Option<String>) -> Result<Value, CoreError> {
    let ctx = WorkbookContext::load(file, ReadMode::Formula)?;
    to_value(&formula_lint::formula_find(&ctx, pattern, sheet.as_deref())?)
}

pub fn lint(file: &Path, sheet: Option<String>) -> Result<Value, CoreError> {
    let ctx = WorkbookContext::load(file, ReadMode::Formula)?;
    to_value(&formula_lint::formula_lint(&ctx, sheet.as_deref()))
}
