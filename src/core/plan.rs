//! The patch-plan wire model: tagged JSON for operations, pre/postconditions,
//! and the envelope-unwrapping a plan file reader must perform.

use crate::core::errors::CoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PlanTarget {
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PlanOptions {
    pub recalc_mode: String,
    pub backup: bool,
    pub fail_on_external_change: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        PlanOptions {
            recalc_mode: "none".to_string(),
            backup: false,
            fail_on_external_change: true,
        }
    }
}

/// Tagged by `type`. Every variant carries only the fields it needs —
/// nothing is defaulted to a sentinel for fields a variant does not use.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    #[serde(rename = "cell.set")]
    CellSet {
        op_id: String,
        #[serde(rename = "ref")]
        reference: String,
        value: Value,
        #[serde(default)]
        cell_type: Option<String>,
        #[serde(default)]
        force_overwrite_formulas: bool,
    },
    #[serde(rename = "range.clear")]
    RangeClear {
        op_id: String,
        #[serde(rename = "ref")]
        reference: String,
        #[serde(default = "default_true")]
        clear_contents: bool,
        #[serde(default)]
        clear_formats: bool,
    },
    #[serde(rename = "formula.set")]
    FormulaSet {
        op_id: String,
        #[serde(rename = "ref")]
        reference: String,
        formula: String,
        #[serde(default)]
        fill_mode: Option<String>,
        #[serde(default)]
        force_overwrite_values: bool,
        #[serde(default)]
        force_overwrite_formulas: bool,
    },
    #[serde(rename = "format.number")]
    FormatNumber {
        op_id: String,
        #[serde(rename = "ref")]
        reference: String,
        style: String,
        #[serde(default)]
        decimals: Option<u32>,
    },
    #[serde(rename = "format.width")]
    FormatWidth {
        op_id: String,
        sheet: String,
        columns: Vec<String>,
        width: f64,
    },
    #[serde(rename = "format.freeze")]
    FormatFreeze {
        op_id: String,
        sheet: String,
        #[serde(default)]
        at: Option<String>,
        #[serde(default)]
        unfreeze: bool,
    },
    #[serde(rename = "sheet.create")]
    SheetCreate {
        op_id: String,
        name: String,
        #[serde(default)]
        position: Option<usize>,
    },
    #[serde(rename = "sheet.rename")]
    SheetRename { op_id: String, old_name: String, new_name: String },
    #[serde(rename = "sheet.delete")]
    SheetDelete { op_id: String, name: String },
    #[serde(rename = "table.create")]
    TableCreate {
        op_id: String,
        sheet: String,
        name: String,
        #[serde(rename = "ref")]
        reference: String,
        #[serde(default)]
        headers: Option<Vec<String>>,
    },
    #[serde(rename = "table.add_column")]
    TableAddColumn {
        op_id: String,
        table: String,
        name: String,
        #[serde(default)]
        formula: Option<String>,
        #[serde(default)]
        default_value: Option<Value>,
    },
    #[serde(rename = "table.delete_column")]
    TableDeleteColumn { op_id: String, table: String, name: String },
    #[serde(rename = "table.delete")]
    TableDelete { op_id: String, table: String },
    #[serde(rename = "table.append_rows")]
    TableAppendRows {
        op_id: String,
        table: String,
        rows: Vec<serde_json::Map<String, Value>>,
        #[serde(default = "default_schema_mode")]
        schema_mode: String,
    },
}

fn default_true() -> bool {
    true
}
fn default_schema_mode() -> String {
    "strict".to_string()
}

impl Operation {
    pub fn op_id(&self) -> &str {
        match self {
            Operation::CellSet { op_id, .. }
            | Operation::RangeClear { op_id, .. }
            | Operation::FormulaSet { op_id, .. }
            | Operation::FormatNumber { op_id, .. }
            | Operation::FormatWidth { op_id, .. }
            | Operation::FormatFreeze { op_id, .. }
            | Operation::SheetCreate { op_id, .. }
            | Operation::SheetRename { op_id, .. }
            | Operation::SheetDelete { op_id, .. }
            | Operation::TableCreate { op_id, .. }
            | Operation::TableAddColumn { op_id, .. }
            | Operation::TableDeleteColumn { op_id, .. }
            | Operation::TableDelete { op_id, .. }
            | Operation::TableAppendRows { op_id, .. } => op_id,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Operation::CellSet { .. } => "cell.set",
            Operation::RangeClear { .. } => "range.clear",
            Operation::FormulaSet { .. } => "formula.set",
            Operation::FormatNumber { .. } => "format.number",
            Operation::FormatWidth { .. } => "format.width",
            Operation::FormatFreeze { .. } => "format.freeze",
            Operation::SheetCreate { .. } => "sheet.create",
            Operation::SheetRename { .. } => "sheet.rename",
            Operation::SheetDelete { .. } => "sheet.delete",
            Operation::TableCreate { .. } => "table.create",
            Operation::TableAddColumn { .. } => "table.add_column",
            Operation::TableDeleteColumn { .. } => "table.delete_column",
            Operation::TableDelete { .. } => "table.delete",
            Operation::TableAppendRows { .. } => "table.append_rows",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Precondition {
    SheetExists { sheet: String },
    TableExists { table: String },
    ColumnExists { table: String, column: String },
    CellValueEquals { #[serde(rename = "ref")] reference: String, expected: Value },
    CellNotEmpty { #[serde(rename = "ref")] reference: String },
    CellValueType { #[serde(rename = "ref")] reference: String, expected_type: String },
    /// Historically un-suffixed precondition; accepts `min`/`max`/`expected`.
    /// A bare `expected` here is treated as an alias for `min` (see
    /// DESIGN.md's Open Question decision).
    TableRowCount {
        table: String,
        #[serde(default)]
        min: Option<usize>,
        #[serde(default)]
        max: Option<usize>,
        #[serde(default)]
        expected: Option<usize>,
    },
    TableRowCountGte { table: String, min_rows: usize },
}

pub type Postcondition = Precondition;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PatchPlan {
    pub schema_version: u32,
    pub plan_id: String,
    pub target: PlanTarget,
    #[serde(default)]
    pub options: PlanOptions,
    #[serde(default)]
    pub preconditions: Vec<Precondition>,
    pub operations: Vec<Operation>,
    #[serde(default)]
    pub postconditions: Vec<Postcondition>,
}

/// Parse plan JSON, auto-unwrapping an envelope wrapper iff the outer object
/// has exactly the envelope shape (`ok`, `command`, `result`, ...) and the
/// inner `result` has the plan shape. Any other shape is `ERR_PLAN_INVALID`.
pub fn parse_plan(text: &str) -> Result<PatchPlan, CoreError> {
    let text = text.trim_start_matches('\u{feff}');
    let value: Value = serde_json::from_str(text)
        .map_err(|e| CoreError::PlanInvalid(format!("not valid JSON: {e}")))?;

    let candidate = if is_envelope_shape(&value) {
        value
            .get("result")
            .cloned()
            .ok_or_else(|| CoreError::PlanInvalid("envelope has no result field".to_string()))?
    } else {
        value
    };

    serde_json::from_value(candidate).map_err(|e| CoreError::PlanInvalid(format!("{e}")))
}

fn is_envelope_shape(value: &Value) -> bool {
    let Some(obj) = value.as_object() else { return false };
    obj.contains_key("ok") && obj.contains_key("command") && obj.contains_key("result")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plan_json() -> String {
        serde_json::json!({
            "schema_version": 1,
            "plan_id": "p1",
            "target": {"file": "book.xlsx"},
            "operations": [
                {"op_id": "op1", "type": "cell.set", "ref": "A1", "value": 1}
            ]
        })
        .to_string()
    }

    #[test]
    fn parses_bare_plan() {
        let plan = parse_plan(&sample_plan_json()).unwrap();
        assert_eq!(plan.operations.len(), 1);
        assert_eq!(plan.operations[0].op_id(), "op1");
    }

    #[test]
    fn auto_unwraps_envelope() {
        let inner: Value = serde_json::from_str(&sample_plan_json()).unwrap();
        let wrapped = serde_json::json!({
            "ok": true,
            "command": "plan.create",
            "target": {},
            "result": inner,
            "metrics": {"duration_ms": 1}
        });
        let plan = parse_plan(&wrapped.to_string()).unwrap();
        assert_eq!(plan.plan_id, "p1");
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(parse_plan("{not json").is_err());
    }
}
