//! Post-apply assertion engine for `xl verify`: a closed set of 5 assertion
//! types, each evaluated read-only against the current workbook model.

use crate::core::errors::CoreError;
use crate::core::workbook::WorkbookContext;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Assertion {
    #[serde(rename = "table.column_exists")]
    TableColumnExists { table: String, column: String },
    #[serde(rename = "table.row_count")]
    TableRowCount {
        table: String,
        #[serde(default)]
        expected: Option<usize>,
        #[serde(default)]
        min: Option<usize>,
        #[serde(default)]
        max: Option<usize>,
    },
    #[serde(rename = "cell.value_equals")]
    CellValueEquals {
        #[serde(rename = "ref")]
        reference: String,
        expected: Value,
    },
    #[serde(rename = "cell.not_empty")]
    CellNotEmpty {
        #[serde(rename = "ref")]
        reference: String,
    },
    #[serde(rename = "cell.value_type")]
    CellValueType {
        #[serde(rename = "ref")]
        reference: String,
        expected_type: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedAssertion {
    #[serde(rename = "type")]
    pub kind: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
    pub message: String,
}

/// Run every assertion and collect the ones that failed (a passed assertion
/// never enters the returned list). An empty vec means verification passed.
pub fn run_assertions(ctx: &WorkbookContext, assertions: &[Assertion]) -> Vec<FailedAssertion> {
    assertions.iter().map(|a| check_one(ctx, a)).filter(|r| !r.passed).collect()
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

fn read_cell(ctx: &WorkbookContext, reference_text: &str) -> Result<(Value, &'static str), String> {
    let (sheet_name, addr) = single_cell(reference_text)?;
    let sheet = ctx.book().get_sheet_by_name(&sheet_name).ok_or_else(|| format!("sheet {sheet_name} not found"))?;
    let Some(cell) = sheet.get_cell(addr.as_str()) else {
        return Ok((Value::Null, "empty"));
    };
    if cell.is_formula() {
        return Ok((Value::String(cell.get_formula().to_string()), "formula"));
    }
    let text = cell.get_value().to_string();
    if text.is_empty() {
        return Ok((Value::Null, "empty"));
    }
    if let Ok(n) = text.parse::<f64>() {
        return Ok((serde_json::json!(n), "number"));
    }
    if text.eq_ignore_ascii_case("true") || text.eq_ignore_ascii_case("false") {
        return Ok((serde_json::json!(text.eq_ignore_ascii_case("true")), "bool"));
    }
    Ok((Value::String(text), "text"))
}

fn check_one(ctx: &WorkbookContext, assertion: &Assertion) -> FailedAssertion {
    match assertion {
        Assertion::TableColumnExists { table, column } => {
            let kind = "table.column_exists".to_string();
            match ctx.find_table(table) {
                None => FailedAssertion {
                    kind,
                    passed: false,
                    expected: None,
                    actual: None,
                    message: format!("table '{table}' not found"),
                },
                Some((_, meta)) => {
                    let found = meta.column_by_name(column).is_some();
                    let names: Vec<&str> = meta.columns.iter().map(|c| c.name.as_str()).collect();
                    FailedAssertion {
                        kind,
                        passed: found,
                        expected: Some(serde_json::json!(column)),
                        actual: Some(serde_json::json!(names)),
                        message: format!(
                            "column '{column}' {} in table '{table}'",
                            if found { "exists" } else { "not found" }
                        ),
                    }
                }
            }
        }
        Assertion::TableRowCount { table, expected, min, max } => {
            let kind = "table.row_count".to_string();
            let Some((_, meta)) = ctx.find_table(table) else {
                return FailedAssertion {
                    kind,
                    passed: false,
                    expected: None,
                    actual: None,
                    message: format!("table '{table}' not found"),
                };
            };
            let actual = meta.row_count() as usize;
            let mut passed = true;
            let mut notes = Vec::new();
            if let Some(e) = expected {
                passed &= actual == *e;
                notes.push(format!("expected={e}"));
            }
            if let Some(m) = min {
                if actual < *m {
                    passed = false;
                }
                notes.push(format!("min={m}"));
            }
            if let Some(m) = max {
                if actual > *m {
                    passed = false;
                }
                notes.push(format!("max={m}"));
            }
            let suffix = if notes.is_empty() { "ok".to_string() } else { notes.join(", ") };
            FailedAssertion {
                kind,
                passed,
                expected: None,
                actual: Some(serde_json::json!(actual)),
                message: format!("table '{table}' row count={actual} ({suffix})"),
            }
        }
        Assertion::CellValueEquals { reference, expected } => {
            let kind = "cell.value_equals".to_string();
            match read_cell(ctx, reference) {
                Err(e) => FailedAssertion { kind, passed: false, expected: Some(expected.clone()), actual: None, message: e },
                Ok((actual, _)) => {
                    let passed = &actual == expected || actual.to_string() == expected.to_string();
                    FailedAssertion {
                        kind,
                        passed,
                        expected: Some(expected.clone()),
                        actual: Some(actual.clone()),
                        message: if passed {
                            format!("cell {reference}: matches")
                        } else {
                            format!("cell {reference}: expected {expected}, got {actual}")
                        },
                    }
                }
            }
        }
        Assertion::CellNotEmpty { reference } => {
            let kind = "cell.not_empty".to_string();
            match read_cell(ctx, reference) {
                Err(e) => FailedAssertion { kind, passed: false, expected: None, actual: None, message: e },
                Ok((value, _)) => {
                    let passed = !value.is_null();
                    FailedAssertion {
                        kind,
                        passed,
                        expected: None,
                        actual: Some(value),
                        message: format!("cell {reference}: {}", if passed { "not empty" } else { "is empty" }),
                    }
                }
            }
        }
        Assertion::CellValueType { reference, expected_type } => {
            let kind = "cell.value_type".to_string();
            match read_cell(ctx, reference) {
                Err(e) => {
                    FailedAssertion { kind, passed: false, expected: Some(serde_json::json!(expected_type)), actual: None, message: e }
                }
                Ok((_, actual_type)) => {
                    let passed = actual_type == expected_type;
                    FailedAssertion {
                        kind,
                        passed,
                        expected: Some(serde_json::json!(expected_type)),
                        actual: Some(serde_json::json!(actual_type)),
                        message: format!(
                            "cell {reference}: type {}",
                            if passed { "matches".to_string() } else { format!("expected {expected_type}, got {actual_type}") }
                        ),
                    }
                }
            }
        }
    }
}

/// `xl verify-assert`: run assertions and translate an overall failure into
/// `ERR_ASSERTION_FAILED`.
pub fn verify_assert(ctx: &WorkbookContext, assertions: &[Assertion]) -> Result<(), CoreError> {
    let failed = run_assertions(ctx, assertions);
    if failed.is_empty() {
        Ok(())
    } else {
        Err(CoreError::AssertionFailed(failed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::ReadMode;
    use crate::core::operations::{self};
    use crate::core::plan::Operation;

    fn sample_workbook() -> (tempfile::TempDir, WorkbookContext) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.xlsx");
        WorkbookContext::create(&path, &["Revenue".to_string()], false).unwrap();
        let mut ctx = WorkbookContext::load(&path, ReadMode::Formula).unwrap();
        operations::apply(
            &mut ctx,
            &Operation::CellSet {
                op_id: "op1".into(),
                reference: "Revenue!A2".into(),
                value: serde_json::json!("ACTUAL"),
                cell_type: None,
                force_overwrite_formulas: false,
            },
        )
        .unwrap();
        (dir, ctx)
    }

    #[test]
    fn cell_value_equals_fails_on_mismatch() {
        let (_dir, ctx) = sample_workbook();
        let assertions = vec![Assertion::CellValueEquals {
            reference: "Revenue!A2".into(),
            expected: serde_json::json!("WRONG"),
        }];
        let err = verify_assert(&ctx, &assertions).unwrap_err();
        assert_eq!(err.code(), "ERR_ASSERTION_FAILED");
    }

    #[test]
    fn cell_value_equals_passes_on_match() {
        let (_dir, ctx) = sample_workbook();
        let assertions = vec![Assertion::CellValueEquals {
            reference: "Revenue!A2".into(),
            expected: serde_json::json!("ACTUAL"),
        }];
        assert!(verify_assert(&ctx, &assertions).is_ok());
    }

    #[test]
    fn cell_not_empty_reports_empty_cell() {
        let (_dir, ctx) = sample_workbook();
        let assertions = vec![Assertion::CellNotEmpty { reference: "Revenue!Z9".into() }];
        let failed = run_assertions(&ctx, &assertions);
        assert_eq!(failed.len(), 1);
        assert!(!failed[0].passed);
    }

    #[test]
    fn table_column_exists_fails_for_missing_table() {
        let (_dir, ctx) = sample_workbook();
        let assertions = vec![Assertion::TableColumnExists { table: "Nope".into(), column: "X".into() }];
        let failed = run_assertions(&ctx, &assertions);
        assert_eq!(failed.len(), 1);
    }
}
