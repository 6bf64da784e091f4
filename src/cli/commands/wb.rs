use crate::cli::commands::to_value;
use crate::core::errors::CoreError;
use crate::core::io::check_lock;
use crate::core::model::ReadMode;
use crate::core::workbook::WorkbookContext;
use serde_json::Value;
use std::path::Path;

pub fn inspect(file: &Path) -> Result<Value, CoreError> {
    let ctx = WorkbookContext::load(file, ReadMode::DataOnly)?;
    to_value(&ctx.workbook_meta())
}

pub fn create(file: &Path, sheets: Vec<String>, force: bool) -> Result<Value, CoreError> {
    WorkbookContext::create(file, &sheets, force)?;
    Ok(serde_json::json!({ "file": file.display().to_string(), "created": true }))
}

pub fn lock_status(file: &Path) -> Result<Value, CoreError> {
    match check_lock(file) {
        Some(diagnostics) => Ok(serde_json::json!({ "locked": true, "diagnostics": diagnostics })),
        None => Ok(serde_json::json!({ "locked": false })),
    }
}
