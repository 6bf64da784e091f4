use crate::cli::commands::to_value;
use crate::core::errors::CoreError;
use crate::core::workflow;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

pub fn validate(workflow_file: &Path) -> Result<Value, CoreError> {
    to_value(&workflow::validate_workflow(workflow_file))
}

pub fn exec(workflow_file: &Path, workbook_file: &Path, lock_timeout_secs: Option<u64>) -> Result<Value, CoreError> {
    let spec = workflow::load_workflow(workflow_file)?;
    let lock_timeout = Some(lock_timeout_secs.map(Duration::from_secs).unwrap_or(Duration::from_secs(10)));
    to_value(&workflow::execute_workflow(&spec, workbook_file, lock_timeout)?)
}
