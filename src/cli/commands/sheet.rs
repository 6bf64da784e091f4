use crate::cli::commands::{apply_single, to_value};
use crate::core::errors::CoreError;
use crate::core::model::ReadMode;
use crate::core::plan::Operation;
use crate::core::workbook::WorkbookContext;
use serde_json::Value;
use std::path::Path;

pub fn ls(file: &Path) -> Result<Value, CoreError> {
    let ctx = WorkbookContext::load(file, ReadMode::DataOnly)?;
    to_value(&ctx.list_sheets())
}

#[allow(clippy::too_many_arguments)]
pub fn create(
    file: &Path,
    name: String,
    position: Option<usize>,
    dry_run: bool,
    backup: bool,
    lock_timeout_secs: Option<u64>,
) -> Result<Value, CoreError> {
    let op = Operation::SheetCreate { op_id: "op1".into(), name, position };
    to_value(&apply_single(file, op, dry_run, backup, lock_timeout_secs)?)
}

#[allow(clippy::too_many_arguments)]
pub fn rename(
    file: &Path,
    old_name: String,
    new_name: String,
    dry_run: bool,
    backup: bool,
    lock_timeout_secs: Option<u64>,
) -> Result<Value, CoreError> {
    let op = Operation::SheetRename { op_id: "op1".into(), old_name, new_name };
    to_value(&apply_single(file, op, dry_run, backup, lock_timeout_secs)?)
}

pub fn delete(
    file: &Path,
    name: String,
    dry_run: bool,
    backup: bool,
    lock_timeout_secs: Option<u64>,
) -> Result<Value, CoreError> {
    let op = Operation::SheetDelete { op_id: "op1".into(), name };
    to_value(&apply_single(file, op, dry_run, backup, lock_timeout_secs)?)
}
