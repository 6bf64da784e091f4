//! Read-only formula inspection: `formula.find` (substring/regex scan) and
//! `formula.lint` (informational smell detector). Named in spec.md's
//! component table but not detailed in the distilled body; built directly
//! from that component description since no Python source survived the
//! distillation for this one.

use crate::core::errors::CoreError;
use crate::core::workbook::WorkbookContext;
use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct FormulaMatch {
    #[serde(rename = "ref")]
    pub reference: String,
    pub formula: String,
}

/// Scan every formula cell (optionally restricted to one sheet) for `pattern`
/// as a regex, falling back to a literal substring match if `pattern` is not
/// valid regex syntax.
pub fn formula_find(ctx: &WorkbookContext, pattern: &str, sheet: Option<&str>) -> Result<Vec<FormulaMatch>, CoreError> {
    let re = Regex::new(pattern).ok();
    let mut matches = Vec::new();

    for ws in ctx.book().get_sheet_collection() {
        if let Some(only) = sheet {
            if ws.get_name() != only {
                continue;
            }
        }
        for_each_formula(ws, |addr, formula| {
            let hit = match &re {
                Some(re) => re.is_match(formula),
                None => formula.contains(pattern),
            };
            if hit {
                matches.push(FormulaMatch { reference: format!("{}!{}", ws.get_name(), addr), formula: formula.to_string() });
            }
        });
    }
    Ok(matches)
}

#[derive(Debug, Clone, Serialize)]
pub struct LintFinding {
    #[serde(rename = "ref")]
    pub reference: String,
    pub kind: String,
    pub message: String,
}

static VOLATILE_FUNCTIONS: &[&str] = &["NOW(", "TODAY(", "RAND(", "RANDBETWEEN(", "OFFSET(", "INDIRECT("];

static REF_ERROR_RE: once_cell::sync::Lazy<Regex> = once_cell::sync::Lazy::new(|| Regex::new(r"#REF!").unwrap());

static STALE_SHEET_REF_RE: once_cell::sync::Lazy<Regex> =
    once_cell::sync::Lazy::new(|| Regex::new(r#""[A-Za-z_][A-Za-z0-9_ ]*!\$?[A-Za-z]{1,3}\$?\d+""#).unwrap());

/// Informational-only findings; never an error. Flags `#REF!`-shaped text,
/// volatile functions, and string literals that look like a cross-sheet
/// reference gone stale (quoted out when a target sheet was renamed/deleted).
pub fn formula_lint(ctx: &WorkbookContext, sheet: Option<&str>) -> Vec<LintFinding> {
    let mut findings = Vec::new();

    for ws in ctx.book().get_sheet_collection() {
        if let Some(only) = sheet {
            if ws.get_name() != only {
                continue;
            }
        }
        for_each_formula(ws, |addr, formula| {
            let reference = format!("{}!{}", ws.get_name(), addr);

            if REF_ERROR_RE.is_match(formula) {
                findings.push(LintFinding {
                    reference: reference.clone(),
                    kind: "ref_error".to_string(),
                    message: "formula contains a broken #REF! reference".to_string(),
                });
            }

            for func in VOLATILE_FUNCTIONS {
                if formula.to_ascii_uppercase().contains(func) {
                    findings.push(LintFinding {
                        reference: reference.clone(),
                        kind: "volatile_function".to_string(),
                        message: format!("formula calls volatile function {}", func.trim_end_matches('(')),
                    });
                }
            }

            if STALE_SHEET_REF_RE.is_match(formula) {
                findings.push(LintFinding {
                    reference: reference.clone(),
                    kind: "stale_reference_literal".to_string(),
                    message: "formula contains a quoted string shaped like a cell reference — possibly a stale cross-sheet link turned to text".to_string(),
                });
            }
        });
    }
    findings
}

fn for_each_formula(ws: &umya_spreadsheet::Worksheet, mut visit: impl FnMut(String, &str)) {
    let (max_col, max_row) = ws.get_highest_column_and_row();
    for row in 1..=max_row.max(1) {
        for col in 1..=max_col.max(1) {
            let addr = crate::core::reference::cell_address(row, col);
            if let Some(cell) = ws.get_cell(addr.as_str()) {
                if cell.is_formula() {
                    visit(addr, cell.get_formula());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::ReadMode;
    use crate::core::operations::{self};
    use crate::core::plan::Operation;

    fn workbook_with_formula(formula: &str) -> (tempfile::TempDir, WorkbookContext) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.xlsx");
        WorkbookContext::create(&path, &["Sheet1".to_string()], false).unwrap();
        let mut ctx = WorkbookContext::load(&path, ReadMode::Formula).unwrap();
        operations::apply(
            &mut ctx,
            &Operation::FormulaSet {
                op_id: "op1".into(),
                reference: "Sheet1!A1".into(),
                formula: formula.to_string(),
                fill_mode: Some("fixed".to_string()),
                force_overwrite_values: false,
                force_overwrite_formulas: false,
            },
        )
        .unwrap();
        (dir, ctx)
    }

    #[test]
    fn finds_formula_by_substring() {
        let (_dir, ctx) = workbook_with_formula("=SUM(B1:B10)");
        let matches = formula_find(&ctx, "SUM", None).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].reference, "Sheet1!A1");
    }

    #[test]
    fn lint_flags_volatile_function() {
        let (_dir, ctx) = workbook_with_formula("=NOW()+1");
        let findings = formula_lint(&ctx, None);
        assert!(findings.iter().any(|f| f.kind == "volatile_function"));
    }

    #[test]
    fn lint_flags_ref_error() {
        let (_dir, ctx) = workbook_with_formula("=A1+#REF!");
        let findings = formula_lint(&ctx, None);
        assert!(findings.iter().any(|f| f.kind == "ref_error"));
    }
}
