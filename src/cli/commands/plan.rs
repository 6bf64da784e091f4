use crate::cli::commands::to_value;
use crate::core::errors::CoreError;
use crate::core::executor::{self, ApplyOptions};
use crate::core::model::ReadMode;
use crate::core::plan::{self, PatchPlan};
use crate::core::policy::{self, Policy};
use crate::core::validator;
use crate::core::workbook::WorkbookContext;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

fn read_plan(plan_file: &Path) -> Result<PatchPlan, CoreError> {
    let text = std::fs::read_to_string(plan_file)
        .map_err(|e| CoreError::PlanInvalid(format!("cannot read {}: {e}", plan_file.display())))?;
    plan::parse_plan(&text)
}

pub fn validate(plan_file: &Path) -> Result<Value, CoreError> {
    let patch_plan = read_plan(plan_file)?;
    let workbook_path = Path::new(&patch_plan.target.file);
    let ctx = WorkbookContext::load(workbook_path, ReadMode::Formula)?;

    let mut result = validator::validate(&ctx, &patch_plan);
    if let Some(policy) = Policy::load_from_dir(workbook_path.parent().unwrap_or(Path::new(".")))
        .map_err(|e| CoreError::Internal(e.to_string()))?
    {
        for violation in policy::check_plan_policy(&policy, &patch_plan) {
            result.valid = false;
            result.checks.push(validator::FailedCheck { kind: violation.kind, detail: violation.message });
        }
    }
    to_value(&result)
}

pub fn apply(
    plan_file: &Path,
    dry_run: bool,
    backup: bool,
    lock_timeout_secs: Option<u64>,
) -> Result<Value, CoreError> {
    let patch_plan = read_plan(plan_file)?;
    let workbook_path = Path::new(&patch_plan.target.file);
    let opts = ApplyOptions {
        dry_run,
        backup,
        lock_timeout: Some(lock_timeout_secs.map(Duration::from_secs).unwrap_or(Duration::from_secs(10))),
    };
    to_value(&executor::apply(workbook_path, &patch_plan, &opts)?)
}
