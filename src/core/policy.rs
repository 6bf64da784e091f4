//! `xl-policy.yaml` loading and plan-time enforcement: protected sheets,
//! protected ranges, and mutation thresholds. Grounded on
//! `xl.validation.policy.Policy`/`check_plan_policy`.

use crate::core::errors::CoreError;
use crate::core::plan::{Operation, PatchPlan};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Policy {
    #[serde(default)]
    pub protected_sheets: Vec<String>,
    #[serde(default)]
    pub protected_ranges: Vec<String>,
    #[serde(default)]
    pub mutation_thresholds: HashMap<String, usize>,
    #[serde(default)]
    pub allowed_commands: Vec<String>,
    #[serde(default)]
    pub redaction: serde_yaml::Value,
}

impl Policy {
    pub fn load(path: &Path) -> std::io::Result<Policy> {
        let text = std::fs::read_to_string(path)?;
        let policy: Policy = serde_yaml::from_str(&text).unwrap_or_default();
        Ok(policy)
    }

    /// `xl-policy.yaml` in `directory`, if present. `None` (not an error) if
    /// the file is absent — policy is opt-in.
    pub fn load_from_dir(directory: &Path) -> std::io::Result<Option<Policy>> {
        let path = directory.join("xl-policy.yaml");
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(Policy::load(&path)?))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_id: Option<String>,
    pub message: String,
}

/// The sheet and cell/range reference an operation is understood to target,
/// for policy purposes. Most variants carry a `Sheet!Ref`-shaped string
/// whose sheet half is split out; `sheet.*` and `table.create` variants
/// carry the sheet name directly. Table-scoped ops (`table.add_column` and
/// friends) resolve only down to the table name — like the system this is
/// grounded on, we do not chase the table back to its sheet here.
fn effective_sheet_and_ref(op: &Operation) -> (Option<String>, Option<String>) {
    fn split_sheet(reference: &str) -> (Option<String>, String) {
        match reference.split_once('!') {
            Some((sheet, _)) => (Some(sheet.trim_matches('\'').to_string()), reference.to_string()),
            None => (None, reference.to_string()),
        }
    }

    match op {
        Operation::CellSet { reference, .. }
        | Operation::RangeClear { reference, .. }
        | Operation::FormulaSet { reference, .. }
        | Operation::FormatNumber { reference, .. } => {
            let (sheet, r) = split_sheet(reference);
            (sheet, Some(r))
        }
        Operation::FormatWidth { sheet, .. } | Operation::FormatFreeze { sheet, .. } => (Some(sheet.clone()), None),
        Operation::SheetCreate { name, .. } => (Some(name.clone()), None),
        Operation::SheetRename { old_name, .. } => (Some(old_name.clone()), None),
        Operation::SheetDelete { name } => (Some(name.clone()), None),
        Operation::TableCreate { sheet, reference, .. } => (Some(sheet.clone()), Some(reference.clone())),
        Operation::TableAddColumn { .. }
        | Operation::TableDeleteColumn { .. }
        | Operation::TableDelete { .. }
        | Operation::TableAppendRows { .. } => (None, None),
    }
}

/// Checks a plan against policy rules and returns every violation found.
/// An empty vec means the plan is policy-clean.
pub fn check_plan_policy(policy: &Policy, plan: &PatchPlan) -> Vec<Violation> {
    violations_for_ops(policy, &plan.operations)
}

/// Loads `xl-policy.yaml` from `workbook_path`'s directory, if present, and
/// raises `CoreError::Protected` if `ops` trips any rule in it. A missing
/// policy file is not an error — policy is opt-in — so this is a no-op on
/// workbooks with no `xl-policy.yaml` next to them. This is the single gate
/// every mutation path (`core::executor::apply`, `core::workflow`'s
/// per-step and `apply`-step dispatch) runs `ops` through before any of
/// them actually touch the workbook.
pub fn enforce(workbook_path: &Path, ops: &[Operation]) -> Result<(), CoreError> {
    let directory = workbook_path.parent().unwrap_or_else(|| Path::new("."));
    let Some(policy) = Policy::load_from_dir(directory).map_err(|e| CoreError::Internal(e.to_string()))? else {
        return Ok(());
    };

    let violations = violations_for_ops(&policy, ops);
    if violations.is_empty() {
        return Ok(());
    }
    let message = violations.into_iter().map(|v| v.message).collect::<Vec<_>>().join("; ");
    Err(CoreError::Protected(message))
}

fn violations_for_ops(policy: &Policy, ops: &[Operation]) -> Vec<Violation> {
    let mut violations = Vec::new();

    for op in ops {
        let (sheet, reference) = effective_sheet_and_ref(op);

        if let Some(sheet) = &sheet {
            if policy.protected_sheets.iter().any(|p| p == sheet) {
                violations.push(Violation {
                    kind: "protected_sheet".to_string(),
                    severity: "error".to_string(),
                    op_id: Some(op.op_id().to_string()),
                    message: format!("Operation {} targets protected sheet '{sheet}'", op.op_id()),
                });
            }
        }

        if let Some(reference) = &reference {
            let full_ref = match (&sheet, reference.contains('!')) {
                (Some(sheet), false) => format!("{sheet}!{reference}"),
                _ => reference.clone(),
            };
            for protected in &policy.protected_ranges {
                let prefix = protected.split_once('!').map(|(s, _)| s).unwrap_or("");
                if !prefix.is_empty() && full_ref.starts_with(prefix) {
                    violations.push(Violation {
                        kind: "protected_range".to_string(),
                        severity: "error".to_string(),
                        op_id: Some(op.op_id().to_string()),
                        message: format!("Operation {} may affect protected range '{protected}'", op.op_id()),
                    });
                }
            }
        }
    }

    let max_rows = policy.mutation_thresholds.get("max_rows").copied();
    let total_rows: usize = ops
        .iter()
        .map(|op| match op {
            Operation::TableAppendRows { rows, .. } => rows.len(),
            _ => 0,
        })
        .sum();

    if let Some(max_rows) = max_rows {
        if total_rows > max_rows {
            violations.push(Violation {
                kind: "mutation_threshold".to_string(),
                severity: "error".to_string(),
                op_id: None,
                message: format!("Plan mutates {total_rows} rows, exceeding threshold of {max_rows}"),
            });
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plan::{PlanOptions, PlanTarget};

    fn plan_with(ops: Vec<Operation>) -> PatchPlan {
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

    #[test]
    fn flags_protected_sheet() {
        let policy = Policy { protected_sheets: vec!["Ledger".into()], ..Default::default() };
        let plan = plan_with(vec![Operation::SheetDelete { op_id: "op1".into(), name: "Ledger".into() }]);
        let violations = check_plan_policy(&policy, &plan);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, "protected_sheet");
    }

    #[test]
    fn flags_protected_range() {
        let policy = Policy { protected_ranges: vec!["Ledger!A1:Z999".into()], ..Default::default() };
        let plan = plan_with(vec![Operation::CellSet {
            op_id: "op1".into(),
            reference: "Ledger!B2".into(),
            value: serde_json::json!(1),
            cell_type: None,
            force_overwrite_formulas: false,
        }]);
        let violations = check_plan_policy(&policy, &plan);
        assert!(violations.iter().any(|v| v.kind == "protected_range"));
    }

    #[test]
    fn flags_mutation_threshold() {
        let mut thresholds = HashMap::new();
        thresholds.insert("max_rows".to_string(), 1);
        let policy = Policy { mutation_thresholds: thresholds, ..Default::default() };
        let rows = vec![serde_json::Map::new(), serde_json::Map::new()];
        let plan = plan_with(vec![Operation::TableAppendRows {
            op_id: "op1".into(),
            table: "Orders".into(),
            rows,
            schema_mode: "strict".into(),
        }]);
        let violations = check_plan_policy(&policy, &plan);
        assert!(violations.iter().any(|v| v.kind == "mutation_threshold"));
    }

    #[test]
    fn clean_plan_has_no_violations() {
        let policy = Policy::default();
        let plan = plan_with(vec![Operation::CellSet {
            op_id: "op1".into(),
            reference: "Sheet1!A1".into(),
            value: serde_json::json!(1),
            cell_type: None,
            force_overwrite_formulas: false,
        }]);
        assert!(check_plan_policy(&policy, &plan).is_empty());
    }
}
