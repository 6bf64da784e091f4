use crate::cli::commands::to_value;
use crate::core::diff::{self, DiffOptions};
use crate::core::errors::CoreError;
use serde_json::Value;
use std::path::Path;

pub fn run(file_a: &Path, file_b: &Path, sheet: Option<String>, include_formulas: bool) -> Result<Value, CoreError> {
    let opts = DiffOptions { sheet_filter: sheet, include_formulas };
    to_value(&diff::diff_workbooks(file_a, file_b, &opts)?)
}
