use crate::cli::commands::{apply_single, to_value};
use crate::core::errors::CoreError;
use crate::core::model::ReadMode;
use crate::core::plan::Operation;
use crate::core::workbook::WorkbookContext;
use serde_json::Value;
use std::path::Path;

pub fn ls(file: &Path) -> Result<Value, CoreError> {
    let ctx = WorkbookContext::load(file, ReadMode::DataOnly)?;
    to_value(&ctx.list_tables())
}

#[allow(clippy::too_many_arguments)]
pub fn create(
    file: &Path,
    sheet: String,
    name: String,
    reference: String,
    headers: Vec<String>,
    dry_run: bool,
    backup: bool,
    lock_timeout_secs: Option<u64>,
) -> Result<Value, CoreError> {
    let headers = if headers.is_empty() { None } else { Some(headers) };
    let op = Operation::TableCreate { op_id: "op1".into(), sheet, name, reference, headers };
    to_value(&apply_single(file, op, dry_run, backup, lock_timeout_secs)?)
}

#[allow(clippy::too_many_arguments)]
pub fn add_column(
    file: &Path,
    table: String,
    name: String,
    formula: Option<String>,
    default_value: Option<Value>,
    dry_run: bool,
    backup: bool,
    lock_timeout_secs: Option<u64>,
) -> Result<Value, CoreError> {
    let op = Operation::TableAddColumn { op_id: "op1".into(), table, name, formula, default_value };
    to_value(&apply_single(file, op, dry_run, backup, lock_timeout_secs)?)
}

pub fn delete_column(
    file: &Path,
    table: String,
    name: String,
    dry_run: bool,
    backup: bool,
    lock_timeout_secs: Option<u64>,
) -> Result<Value, CoreError> {
    let op = Operation::TableDeleteColumn { op_id: "op1".into(), table, name };
    to_value(&apply_single(file, op, dry_run, backup, lock_timeout_secs)?)
}

pub fn delete(
    file: &Path,
    table: String,
    dry_run: bool,
    backup: bool,
    lock_timeout_secs: Option<u64>,
) -> Result<Value, CoreError> {
    let op = Operation::TableDelete { op_id: "op1".into(), table };
    to_value(&apply_single(file, op, dry_run, backup, lock_timeout_secs)?)
}

#[allow(clippy::too_many_arguments)]
pub fn append_rows(
    file: &Path,
    table: String,
    rows_json: String,
    schema_mode: Option<String>,
    dry_run: bool,
    backup: bool,
    lock_timeout_secs: Option<u64>,
) -> Result<Value, CoreError> {
    let rows: Vec<serde_json::Map<String, Value>> = serde_json::from_str(&rows_json)
        .map_err(|e| CoreError::InvalidArgument(format!("rows must be a JSON array of objects: {e}")))?;
    let op = Operation::TableAppendRows {
        op_id: "op1".into(),
        table,
        rows,
        schema_mode: schema_mode.unwrap_or_else(|| "strict".to_string()),
    };
    to_value(&apply_single(file, op, dry_run, backup, lock_timeout_secs)?)
}
