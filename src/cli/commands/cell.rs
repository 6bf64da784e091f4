use crate::cli::commands::{apply_single, to_value};
use crate::core::errors::CoreError;
use crate::core::model::ReadMode;
use crate::core::plan::Operation;
use crate::core::reference::{self, Reference};
use crate::core::workbook::WorkbookContext;
use serde_json::Value;
use std::path::Path;

pub fn get(file: &Path, reference_text: &str) -> Result<Value, CoreError> {
    let ctx = WorkbookContext::load(file, ReadMode::Formula)?;
    match reference::parse_reference(reference_text)? {
        Reference::Cell { sheet: Some(sheet), row, col } => {
            let addr = reference::cell_address(row, col);
            let ws = ctx.book().get_sheet_by_name(&sheet).ok_or_else(|| CoreError::SheetNotFound(sheet.clone()))?;
            let value = match ws.get_cell(addr.as_str()) {
                None => Value::Null,
                Some(cell) if cell.is_formula() => serde_json::json!({ "formula": cell.get_formula() }),
                Some(cell) => {
                    let text = cell.get_value().to_string();
                    if text.is_empty() {
                        Value::Null
                    } else if let Ok(n) = text.parse::<f64>() {
                        serde_json::json!(n)
                    } else {
                        Value::String(text)
                    }
                }
            };
            Ok(serde_json::json!({ "ref": format!("{sheet}!{addr}"), "value": value }))
        }
        Reference::Cell { sheet: None, .. } => {
            Err(CoreError::RangeInvalid(format!("{reference_text} needs a sheet qualifier")))
        }
        _ => Err(CoreError::RangeInvalid(format!("{reference_text} is not a single cell"))),
    }
}

#[allow(clippy::too_many_arguments)]
pub fn set(
    file: &Path,
    reference: String,
    value: Value,
    cell_type: Option<String>,
    force_overwrite_formulas: bool,
    dry_run: bool,
    backup: bool,
    lock_timeout_secs: Option<u64>,
) -> Result<Value, CoreError> {
    let op = Operation::CellSet { op_id: "op1".into(), reference, value, cell_type, force_overwrite_formulas };
    to_value(&apply_single(file, op, dry_run, backup, lock_timeout_secs)?)
}
