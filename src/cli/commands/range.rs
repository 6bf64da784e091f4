use crate::cli::commands::{apply_single, to_value};
use crate::core::errors::CoreError;
use crate::core::plan::Operation;
use serde_json::Value;
use std::path::Path;

#[allow(clippy::too_many_arguments)]
pub fn clear(
    file: &Path,
    reference: String,
    keep_contents: bool,
    formats: bool,
    dry_run: bool,
    backup: bool,
    lock_timeout_secs: Option<u64>,
) -> Result<Value, CoreError> {
    let op = Operation::RangeClear { op_id: "op1".into(), reference, clear_contents: !keep_contents, clear_formats: formats };
    to_value(&apply_single(file, op, dry_run, backup, lock_timeout_secs)?)
}
