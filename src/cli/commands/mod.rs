//! Per-noun command implementations. Mutating commands build a single-
//! operation `PatchPlan` and run it through the same executor a multi-op
//! `plan apply` uses, so `cell set` and friends get the lock/validate/
//! backup/atomic-save path for free rather than a shortcut around it.

pub mod cell;
pub mod diff;
pub mod format;
pub mod formula;
pub mod plan;
pub mod query;
pub mod range;
pub mod run;
pub mod sheet;
pub mod table;
pub mod verify;
pub mod wb;

use crate::core::errors::CoreError;
use crate::core::executor::{self, ApplyOptions, ApplyResult};
use crate::core::plan::{Operation, PatchPlan, PlanOptions, PlanTarget};
use std::path::Path;
use std::time::Duration;

pub fn apply_single(
    path: &Path,
    op: Operation,
    dry_run: bool,
    backup: bool,
    lock_timeout_secs: Option<u64>,
) -> Result<ApplyResult, CoreError> {
    let plan = PatchPlan {
        schema_version: 1,
        plan_id: format!("cli-{}", op.op_id()),
        target: PlanTarget { file: path.display().to_string(), fingerprint: None },
        options: PlanOptions { fail_on_external_change: false, ..PlanOptions::default() },
        preconditions: Vec::new(),
        operations: vec![op],
        postconditions: Vec::new(),
    };
    let opts = ApplyOptions {
        dry_run,
        backup,
        lock_timeout: Some(lock_timeout_secs.map(Duration::from_secs).unwrap_or(Duration::from_secs(10))),
    };
    executor::apply(path, &plan, &opts)
}

pub fn to_value<T: serde::Serialize>(v: &T) -> Result<serde_json::Value, CoreError> {
    serde_json::to_value(v).map_err(|e| CoreError::Internal(e.to_string()))
}
