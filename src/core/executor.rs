//! Sequences a validated patch plan onto a locked workbook: validate, apply
//! operations in order with first-failure rollback, dry-run short-circuit,
//! optional backup, atomic save.

use crate::core::errors::CoreError;
use crate::core::io::{write_backup, LockGuard, WorkbookLock};
use crate::core::model::{ChangeRecord, ReadMode};
use crate::core::operations;
use crate::core::plan::PatchPlan;
use crate::core::policy;
use crate::core::validator::validate;
use crate::core::workbook::WorkbookContext;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub struct ApplyOptions {
    pub dry_run: bool,
    pub backup: bool,
    pub lock_timeout: Option<Duration>,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        ApplyOptions { dry_run: false, backup: false, lock_timeout: Some(Duration::from_secs(10)) }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DryRunSummary {
    pub total_changes: usize,
    pub by_type: HashMap<String, usize>,
    pub by_sheet: HashMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplyResult {
    pub applied: bool,
    pub operations_applied: usize,
    pub changes: Vec<ChangeRecord>,
    pub fingerprint_before: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint_after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run_summary: Option<DryRunSummary>,
}

/// Acquires the sidecar lock, validates, applies every operation in
/// declared order, and — unless `dry_run` — atomically saves. The lock is
/// released on every exit path, including the early returns below.
pub fn apply(workbook_path: &Path, plan: &PatchPlan, opts: &ApplyOptions) -> Result<ApplyResult, CoreError> {
    let lock = acquire_lock(workbook_path, opts.lock_timeout)?;
    let result = apply_locked(workbook_path, plan, opts);
    drop(lock);
    result
}

fn acquire_lock(workbook_path: &Path, timeout: Option<Duration>) -> Result<LockGuard, CoreError> {
    WorkbookLock::acquire(workbook_path, timeout)
}

fn apply_locked(workbook_path: &Path, plan: &PatchPlan, opts: &ApplyOptions) -> Result<ApplyResult, CoreError> {
    let mut ctx = WorkbookContext::load(workbook_path, ReadMode::Formula)?;
    let fingerprint_before = ctx.fingerprint().to_string();

    let validation = validate(&ctx, plan);
    if !validation.valid {
        return Err(CoreError::ValidationFailed(validation.checks));
    }
    policy::enforce(workbook_path, &plan.operations)?;

    let mut changes = Vec::with_capacity(plan.operations.len());
    for op in &plan.operations {
        match operations::apply(&mut ctx, op) {
            Ok(change) => changes.push(change),
            Err(cause) => {
                return Err(CoreError::OperationFailed { op_id: op.op_id().to_string(), cause: cause.to_string() });
            }
        }
    }

    if opts.dry_run {
        return Ok(ApplyResult {
            applied: false,
            operations_applied: changes.len(),
            dry_run_summary: Some(summarize(&changes)),
            changes,
            fingerprint_before,
            fingerprint_after: None,
            backup_path: None,
        });
    }

    let backup_path = if opts.backup || plan.options.backup {
        Some(write_backup(workbook_path).map_err(|e| CoreError::Internal(format!("backup failed: {e}")))?)
    } else {
        None
    };

    let fingerprint_after = ctx.save()?;

    Ok(ApplyResult {
        applied: true,
        operations_applied: changes.len(),
        changes,
        fingerprint_before,
        fingerprint_after: Some(fingerprint_after),
        backup_path,
        dry_run_summary: None,
    })
}

fn summarize(changes: &[ChangeRecord]) -> DryRunSummary {
    let mut by_type: HashMap<String, usize> = HashMap::new();
    let mut by_sheet: HashMap<String, usize> = HashMap::new();
    for change in changes {
        *by_type.entry(change.kind.clone()).or_insert(0) += 1;
        let sheet = change.target.split('!').next().unwrap_or(&change.target).to_string();
        *by_sheet.entry(sheet).or_insert(0) += 1;
    }
    DryRunSummary { total_changes: changes.len(), by_type, by_sheet }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plan::{Operation, PlanOptions, PlanTarget};

    fn sample_plan(ops: Vec<Operation>) -> PatchPlan {
        PatchPlan {
            schema_version: 1,
            plan_id: "p1".into(),
            target: PlanTarget::default(),
            options: PlanOptions::default(),
            preconditions: Vec::new(),
            operations: ops,
            postconditions: Vec::new(),
        }
    }

    fn sample_workbook() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.xlsx");
        WorkbookContext::create(&path, &["Sheet1".to_string()], false).unwrap();
        (dir, path)
    }

    #[test]
    fn dry_run_does_not_touch_disk() {
        let (_dir, path) = sample_workbook();
        let before = std::fs::read(&path).unwrap();
        let plan = sample_plan(vec![Operation::CellSet {
            op_id: "op1".into(),
            reference: "Sheet1!A1".into(),
            value: serde_json::json!(1),
            cell_type: None,
            force_overwrite_formulas: false,
        }]);
        let result = apply(&path, &plan, &ApplyOptions { dry_run: true, backup: false, lock_timeout: Some(Duration::from_secs(1)) }).unwrap();
        assert!(!result.applied);
        assert!(result.fingerprint_after.is_none());
        let after = std::fs::read(&path).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn apply_saves_and_updates_fingerprint() {
        let (_dir, path) = sample_workbook();
        let plan = sample_plan(vec![Operation::CellSet {
            op_id: "op1".into(),
            reference: "Sheet1!A1".into(),
            value: serde_json::json!(42),
            cell_type: None,
            force_overwrite_formulas: false,
        }]);
        let result = apply(&path, &plan, &ApplyOptions { dry_run: false, backup: false, lock_timeout: Some(Duration::from_secs(1)) }).unwrap();
        assert!(result.applied);
        assert_ne!(result.fingerprint_before, result.fingerprint_after.unwrap());
    }

    #[test]
    fn protected_sheet_policy_blocks_apply_before_any_operation_runs() {
        let (dir, path) = sample_workbook();
        std::fs::write(dir.path().join("xl-policy.yaml"), "protected_sheets:\n  - Sheet1\n").unwrap();
        let before = std::fs::read(&path).unwrap();

        let plan = sample_plan(vec![Operation::CellSet {
            op_id: "op1".into(),
            reference: "Sheet1!A1".into(),
            value: serde_json::json!(1),
            cell_type: None,
            force_overwrite_formulas: false,
        }]);
        let err = apply(&path, &plan, &ApplyOptions { dry_run: false, backup: false, lock_timeout: Some(Duration::from_secs(1)) }).unwrap_err();
        assert_eq!(err.code(), "ERR_PROTECTED");
        assert_eq!(std::fs::read(&path).unwrap(), before, "file must be unchanged when policy blocks the plan");
    }

    #[test]
    fn failing_operation_leaves_file_untouched() {
        let (_dir, path) = sample_workbook();
        let before = std::fs::read(&path).unwrap();
        let plan = sample_plan(vec![Operation::SheetDelete { op_id: "op1".into(), name: "NoSuchSheet".into() }]);
        let err = apply(&path, &plan, &ApplyOptions { dry_run: false, backup: false, lock_timeout: Some(Duration::from_secs(1)) }).unwrap_err();
        assert_eq!(err.code(), "ERR_VALIDATION_FAILED");
        let after = std::fs::read(&path).unwrap();
        assert_eq!(before, after);
    }
}
