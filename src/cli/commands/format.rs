use crate::cli::commands::{apply_single, to_value};
use crate::core::errors::CoreError;
use crate::core::plan::Operation;
use serde_json::Value;
use std::path::Path;

#[allow(clippy::too_many_arguments)]
pub fn number(
    file: &Path,
    reference: String,
    style: String,
    decimals: Option<u32>,
    dry_run: bool,
    backup: bool,
    lock_timeout_secs: Option<u64>,
) -> Result<Value, CoreError> {
    let op = Operation::FormatNumber { op_id: "op1".into(), reference, style, decimals };
    to_value(&apply_single(file, op, dry_run, backup, lock_timeout_secs)?)
}

#[allow(clippy::too_many_arguments)]
pub fn width(
    file: &Path,
    sheet: String,
    columns: Vec<String>,
    width: f64,
    dry_run: bool,
    backup: bool,
    lock_timeout_secs: Option<u64>,
) -> Result<Value, CoreError> {
    let op = Operation::FormatWidth { op_id: "op1".into(), sheet, columns, width };
    to_value(&apply_single(file, op, dry_run, backup, lock_timeout_secs)?)
}

#[allow(clippy::too_many_arguments)]
pub fn freeze(
    file: &Path,
    sheet: String,
    at: Option<String>,
    unfreeze: bool,
    dry_run: bool,
    backup: bool,
    lock_timeout_secs: Option<u64>,
) -> Result<Value, CoreError> {
    let op = Operation::FormatFreeze { op_id: "op1".into(), sheet, at, unfreeze };
    to_value(&apply_single(file, op, dry_run, backup, lock_timeout_secs)?)
}
