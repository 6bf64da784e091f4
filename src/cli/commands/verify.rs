use crate::cli::commands::to_value;
use crate::core::errors::CoreError;
use crate::core::model::ReadMode;
use crate::core::verify::{self, Assertion};
use crate::core::workbook::WorkbookContext;
use serde_json::Value;
use std::path::Path;

pub fn run(file: &Path, assertions_file: &Path) -> Result<Value, CoreError> {
    let text = std::fs::read_to_string(assertions_file)
        .map_err(|e| CoreError::InvalidArgument(format!("cannot read {}: {e}", assertions_file.display())))?;
    let assertions: Vec<Assertion> = serde_json::from_str(&text)
        .map_err(|e| CoreError::InvalidArgument(format!("assertions file must be a JSON array: {e}")))?;

    let ctx = WorkbookContext::load(file, ReadMode::DataOnly)?;
    verify::verify_assert(&ctx, &assertions)?;
    to_value(&serde_json::json!({ "passed": true, "assertions": assertions.len() }))
}
