use crate::cli::commands::to_value;
use crate::core::errors::CoreError;
use crate::core::model::ReadMode;
use crate::core::query;
use crate::core::workbook::WorkbookContext;
use serde_json::Value;
use std::path::Path;

/// No `QueryBackend` is wired into the binary — this always returns
/// `ERR_UNSUPPORTED`, truthfully reflecting that no SQL engine ships here.
pub fn run(file: &Path, sql: &str) -> Result<Value, CoreError> {
    let ctx = WorkbookContext::load(file, ReadMode::DataOnly)?;
    to_value(&query::run_query(&ctx, sql, None)?)
}
