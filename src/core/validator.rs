//! Validates a patch plan against a workbook context without mutating it:
//! fingerprint check, preconditions, then per-operation dry checks against a
//! shadow model of what earlier operations in the same plan would have done.

use crate::core::errors::CoreError;
use crate::core::model::TableMeta;
use crate::core::plan::{Operation, PatchPlan, Precondition};
use crate::core::workbook::WorkbookContext;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedCheck {
    pub kind: String,
    pub detail: String,
}

impl FailedCheck {
    fn new(kind: &str, detail: impl Into<String>) -> Self {
        FailedCheck { kind: kind.to_string(), detail: detail.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub checks: Vec<FailedCheck>,
}

/// Shadow state accumulated while dry-checking operations in declared order,
/// so that e.g. two `table.add_column` with the same name in one plan fail
/// as a pair even though neither has touched the real model yet.
#[derive(Default)]
struct ShadowState {
    planned_columns: HashSet<(String, String)>,
    deleted_columns: HashSet<(String, String)>,
    created_sheets: HashSet<String>,
    deleted_sheets: HashSet<String>,
    created_tables: HashSet<String>,
    deleted_tables: HashSet<String>,
}

pub fn validate(ctx: &WorkbookContext, plan: &PatchPlan) -> ValidationResult {
    let mut checks = Vec::new();

    if let Some(expected) = &plan.target.fingerprint {
        if plan.options.fail_on_external_change && expected != ctx.fingerprint() {
            checks.push(FailedCheck::new(
                "fingerprint_conflict",
                format!("expected {expected}, found {}", ctx.fingerprint()),
            ));
        }
    }

    for pre in &plan.preconditions {
        if let Err(detail) = check_precondition(ctx, pre) {
            checks.push(FailedCheck::new("precondition_failed", detail));
        }
    }

    let mut shadow = ShadowState::default();
    for op in &plan.operations {
        if let Err(detail) = dry_check(ctx, &shadow, op) {
            checks.push(FailedCheck::new("operation_invalid", format!("{}: {detail}", op.op_id())));
        }
        record_shadow_effect(&mut shadow, op);
    }

    for post in &plan.postconditions {
        if let Err(detail) = check_precondition(ctx, post) {
            checks.push(FailedCheck::new("postcondition_unreachable", detail));
        }
    }

    ValidationResult { valid: checks.is_empty(), checks }
}

fn check_precondition(ctx: &WorkbookContext, pre: &Precondition) -> Result<(), String> {
    match pre {
        Precondition::SheetExists { sheet } => {
            if ctx.book().get_sheet_by_name(sheet).is_none() {
                return Err(format!("sheet {sheet} does not exist"));
            }
        }
        Precondition::TableExists { table } => {
            if ctx.find_table(table).is_none() {
                return Err(format!("table {table} does not exist"));
            }
        }
        Precondition::ColumnExists { table, column } => {
            let (_, meta) = ctx.find_table(table).ok_or_else(|| format!("table {table} does not exist"))?;
            if meta.column_by_name(column).is_none() {
                return Err(format!("column {column} does not exist on table {table}"));
            }
        }
        Precondition::CellValueEquals { reference, expected } => {
            let current = read_cell_json(ctx, reference)?;
            if &current != expected {
                return Err(format!("{reference} is {current}, expected {expected}"));
            }
        }
        Precondition::CellNotEmpty { reference } => {
            let current = read_cell_json(ctx, reference)?;
            if current.is_null() || current == serde_json::json!("") {
                return Err(format!("{reference} is empty"));
            }
        }
        Precondition::CellValueType { reference, expected_type } => {
            let (sheet_name, addr) = single_cell(reference)?;
            let sheet = ctx.book().get_sheet_by_name(&sheet_name).ok_or_else(|| format!("sheet {sheet_name} does not exist"))?;
            let cell = sheet.get_cell(addr.as_str());
            let actual = match cell {
                Some(c) if c.is_formula() => "formula",
                Some(c) if !c.get_value().is_empty() && c.get_value().parse::<f64>().is_ok() => "number",
                Some(c) if !c.get_value().is_empty() => "text",
                _ => "empty",
            };
            if actual != expected_type {
                return Err(format!("{reference} has type {actual}, expected {expected_type}"));
            }
        }
        Precondition::TableRowCount { table, min, max, expected } => {
            let (_, meta) = ctx.find_table(table).ok_or_else(|| format!("table {table} does not exist"))?;
            let rows = meta.row_count();
            let effective_min = min.or(*expected);
            if let Some(min) = effective_min {
                if (rows as usize) < min {
                    return Err(format!("table {table} has {rows} rows, expected >= {min}"));
                }
            }
            if let Some(max) = max {
                if (rows as usize) > *max {
                    return Err(format!("table {table} has {rows} rows, expected <= {max}"));
                }
            }
        }
        Precondition::TableRowCountGte { table, min_rows } => {
            let (_, meta) = ctx.find_table(table).ok_or_else(|| format!("table {table} does not exist"))?;
            let rows = meta.row_count();
            if (rows as usize) < *min_rows {
                return Err(format!("table {table} has {rows} rows, expected >= {min_rows}"));
            }
        }
    }
    Ok(())
}

fn single_cell(reference_text: &str) -> Result<(String, String), String> {
    match crate::core::reference::parse_reference(reference_text) {
        Ok(crate::core::reference::Reference::Cell { sheet: Some(sheet), row, col }) => {
            Ok((sheet, crate::core::reference::cell_address(row, col)))
        }
        Ok(crate::core::reference::Reference::Cell { sheet: None, .. }) => {
            Err(format!("{reference_text} needs a sheet qualifier"))
        }
        _ => Err(format!("{reference_text} is not a single cell reference")),
    }
}

fn read_cell_json(ctx: &WorkbookContext, reference_text: &str) -> Result<serde_json::Value, String> {
    let (sheet_name, addr) = single_cell(reference_text)?;
    let sheet = ctx.book().get_sheet_by_name(&sheet_name).ok_or_else(|| format!("sheet {sheet_name} does not exist"))?;
    let Some(cell) = sheet.get_cell(addr.as_str()) else {
        return Ok(serde_json::Value::Null);
    };
    if cell.is_formula() {
        return Ok(serde_json::json!(cell.get_formula()));
    }
    let text = cell.get_value().to_string();
    if text.is_empty() {
        return Ok(serde_json::Value::Null);
    }
    if let Ok(n) = text.parse::<f64>() {
        return Ok(serde_json::json!(n));
    }
    Ok(serde_json::json!(text))
}

fn dry_check(ctx: &WorkbookContext, shadow: &ShadowState, op: &Operation) -> Result<(), String> {
    match op {
        Operation::CellSet { reference, .. } | Operation::RangeClear { reference, .. } | Operation::FormulaSet { reference, .. } | Operation::FormatNumber { reference, .. } => {
            crate::core::reference::parse_reference(reference).map_err(|e| e.to_string())?;
        }
        Operation::FormatWidth { sheet, .. } | Operation::FormatFreeze { sheet, .. } => {
            if ctx.book().get_sheet_by_name(sheet).is_none() && !shadow.created_sheets.contains(sheet) {
                return Err(format!("sheet {sheet} does not exist"));
            }
        }
        Operation::SheetCreate { name, .. } => {
            if (ctx.book().get_sheet_by_name(name).is_some() || shadow.created_sheets.contains(name))
                && !shadow.deleted_sheets.contains(name)
            {
                return Err(format!("sheet {name} already exists"));
            }
        }
        Operation::SheetRename { old_name, new_name } => {
            if ctx.book().get_sheet_by_name(old_name).is_none() && !shadow.created_sheets.contains(old_name) {
                return Err(format!("sheet {old_name} does not exist"));
            }
            if ctx.book().get_sheet_by_name(new_name).is_some() || shadow.created_sheets.contains(new_name) {
                return Err(format!("sheet {new_name} already exists"));
            }
        }
        Operation::SheetDelete { name } => {
            if ctx.book().get_sheet_by_name(name).is_none() && !shadow.created_sheets.contains(name) {
                return Err(format!("sheet {name} does not exist"));
            }
            let remaining = ctx.book().get_sheet_collection().len() + shadow.created_sheets.len() - shadow.deleted_sheets.len();
            if remaining <= 1 {
                return Err("cannot delete the last sheet".to_string());
            }
        }
        Operation::TableCreate { sheet, name, reference, .. } => {
            if ctx.book().get_sheet_by_name(sheet).is_none() && !shadow.created_sheets.contains(sheet) {
                return Err(format!("sheet {sheet} does not exist"));
            }
            if ctx.find_table(name).is_some() || shadow.created_tables.contains(name) {
                return Err(format!("table {name} already exists"));
            }
            crate::core::reference::parse_reference(reference).map_err(|e| e.to_string())?;
        }
        Operation::TableAddColumn { table, name, .. } => {
            let meta = table_meta_or_shadow(ctx, shadow, table)?;
            let key = (table.clone(), name.to_ascii_lowercase());
            if meta.has_column_case_folded(name) || shadow.planned_columns.contains(&key) {
                return Err(format!("column {name} already exists on table {table}"));
            }
        }
        Operation::TableDeleteColumn { table, name } => {
            let meta = table_meta_or_shadow(ctx, shadow, table)?;
            let key = (table.clone(), name.to_ascii_lowercase());
            if !meta.has_column_case_folded(name) && !shadow.planned_columns.contains(&key) {
                return Err(format!("column {name} does not exist on table {table}"));
            }
            if shadow.deleted_columns.contains(&key) {
                return Err(format!("column {name} already scheduled for deletion on table {table}"));
            }
        }
        Operation::TableDelete { table } => {
            table_meta_or_shadow(ctx, shadow, table)?;
        }
        Operation::TableAppendRows { table, rows, schema_mode } => {
            let meta = table_meta_or_shadow(ctx, shadow, table)?;
            for row in rows {
                for key in row.keys() {
                    let matches = meta.columns.iter().any(|c| {
                        if schema_mode == "map-by-header" {
                            c.name.eq_ignore_ascii_case(key)
                        } else {
                            &c.name == key
                        }
                    });
                    if !matches {
                        return Err(format!("unknown column {key} in append_rows for {table}"));
                    }
                }
            }
        }
    }
    Ok(())
}

fn table_meta_or_shadow(ctx: &WorkbookContext, shadow: &ShadowState, table: &str) -> Result<TableMeta, String> {
    if let Some((_, meta)) = ctx.find_table(table) {
        return Ok(meta);
    }
    if shadow.created_tables.contains(table) {
        return Err(format!(
            "table {table} was created earlier in this plan; its shape cannot be dry-checked further"
        ));
    }
    Err(format!("table {table} does not exist"))
}

fn record_shadow_effect(shadow: &mut ShadowState, op: &Operation) {
    match op {
        Operation::SheetCreate { name, .. } => {
            shadow.created_sheets.insert(name.clone());
        }
        Operation::SheetDelete { name } => {
            shadow.deleted_sheets.insert(name.clone());
        }
        Operation::TableCreate { name, .. } => {
            shadow.created_tables.insert(name.clone());
        }
        Operation::TableDelete { table } => {
            shadow.deleted_tables.insert(table.clone());
        }
        Operation::TableAddColumn { table, name, .. } => {
            shadow.planned_columns.insert((table.clone(), name.to_ascii_lowercase()));
        }
        Operation::TableDeleteColumn { table, name } => {
            shadow.deleted_columns.insert((table.clone(), name.to_ascii_lowercase()));
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::ReadMode;
    use crate::core::plan::{PatchPlan, PlanOptions, PlanTarget};

    fn sample_workbook() -> (tempfile::TempDir, WorkbookContext) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.xlsx");
        WorkbookContext::create(&path, &["Sheet1".to_string()], false).unwrap();
        let ctx = WorkbookContext::load(&path, ReadMode::Formula).unwrap();
        (dir, ctx)
    }

    fn empty_plan() -> PatchPlan {
        PatchPlan {
            schema_version: 1,
            plan_id: "p".into(),
            target: PlanTarget::default(),
            options: PlanOptions::default(),
            preconditions: Vec::new(),
            operations: Vec::new(),
            postconditions: Vec::new(),
        }
    }

    #[test]
    fn sheet_exists_precondition_fails_for_missing_sheet() {
        let (_dir, ctx) = sample_workbook();
        let mut plan = empty_plan();
        plan.preconditions.push(Precondition::SheetExists { sheet: "Nope".into() });
        let result = validate(&ctx, &plan);
        assert!(!result.valid);
    }

    #[test]
    fn duplicate_add_column_in_same_plan_fails_as_pair() {
        let (_dir, mut ctx) = sample_workbook();
        crate::core::operations::apply(
            &mut ctx,
            &Operation::TableCreate {
                op_id: "t0".into(),
                sheet: "Sheet1".into(),
                name: "T1".into(),
                reference: "A1:B2".into(),
                headers: Some(vec!["A".into(), "B".into()]),
            },
        )
        .unwrap();

        let mut plan = empty_plan();
        plan.operations.push(Operation::TableAddColumn {
            op_id: "op1".into(),
            table: "T1".into(),
            name: "C".into(),
            formula: None,
            default_value: None,
        });
        plan.operations.push(Operation::TableAddColumn {
            op_id: "op2".into(),
            table: "T1".into(),
            name: "C".into(),
            formula: None,
            default_value: None,
        });
        let result = validate(&ctx, &plan);
        assert!(!result.valid);
        assert!(result.checks.iter().any(|c| c.detail.contains("op2")));
    }

    #[test]
    fn fingerprint_mismatch_is_reported() {
        let (_dir, ctx) = sample_workbook();
        let mut plan = empty_plan();
        plan.target.fingerprint = Some("sha256:deadbeef".to_string());
        let result = validate(&ctx, &plan);
        assert!(!result.valid);
        assert!(result.checks.iter().any(|c| c.kind == "fingerprint_conflict"));
    }
}
