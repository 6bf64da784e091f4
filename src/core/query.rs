//! Per-table columnar snapshot construction for the read-only `query` step,
//! plus the `QueryBackend` trait a real SQL engine would implement. This
//! crate carries no SQL engine itself — the teacher pack has none, and
//! fabricating one would be out of scope.

use crate::core::errors::CoreError;
use crate::core::workbook::WorkbookContext;
use serde_json::Value;
use std::collections::HashMap;

/// One table's data rows, materialized column-by-column the way
/// `_run_query`'s per-table loop does, minus the DuckDB insert.
#[derive(Debug, Clone)]
pub struct TableSnapshot {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<HashMap<String, Value>>,
}

fn cell_to_row_col(addr: &str) -> (u32, u32) {
    match crate::core::reference::parse_reference(addr) {
        Ok(crate::core::reference::Reference::Cell { row, col, .. }) => (row, col),
        _ => (1, 1),
    }
}

/// Builds one snapshot per table defined anywhere in the workbook.
pub fn build_snapshots(ctx: &WorkbookContext) -> Vec<TableSnapshot> {
    let mut snapshots = Vec::new();
    for ws in ctx.book().get_sheet_collection() {
        for table in ws.get_tables() {
            let (start, end) = table.get_area();
            let (min_row, min_col) = cell_to_row_col(start);
            let (max_row, max_col) = cell_to_row_col(end);
            let col_names: Vec<String> =
                table.get_table_column_collection().iter().map(|c| c.get_name().to_string()).collect();

            let mut rows = Vec::new();
            for row in (min_row + 1)..=max_row {
                let mut record = HashMap::with_capacity(col_names.len());
                for (ci, col_name) in col_names.iter().enumerate() {
                    let col = min_col + ci as u32;
                    let addr = crate::core::reference::cell_address(row, col);
                    let value = match ws.get_cell(addr.as_str()) {
                        None => Value::Null,
                        Some(cell) => cell_to_json(cell),
                    };
                    record.insert(col_name.clone(), value);
                }
                rows.push(record);
            }

            snapshots.push(TableSnapshot { name: table.get_name().to_string(), columns: col_names, rows });
        }
    }
    snapshots
}

fn cell_to_json(cell: &umya_spreadsheet::Cell) -> Value {
    if cell.is_formula() {
        return Value::String(cell.get_formula().to_string());
    }
    let text = cell.get_value().to_string();
    if text.is_empty() {
        return Value::Null;
    }
    if let Ok(n) = text.parse::<i64>() {
        return serde_json::json!(n);
    }
    if let Ok(n) = text.parse::<f64>() {
        return serde_json::json!(n);
    }
    Value::String(text)
}

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<HashMap<String, Value>>,
    pub row_count: usize,
}

/// Opaque hook a real SQL engine (DataFusion, rusqlite, etc.) plugs into.
/// No implementation ships in this crate — `workflow.rs`'s `query` step
/// returns `ERR_UNSUPPORTED` unless a caller supplies one.
pub trait QueryBackend {
    fn run(&self, snapshots: &[TableSnapshot], sql: &str) -> Result<QueryResult, CoreError>;
}

pub fn run_query(
    ctx: &WorkbookContext,
    sql: &str,
    backend: Option<&dyn QueryBackend>,
) -> Result<QueryResult, CoreError> {
    let snapshots = build_snapshots(ctx);
    match backend {
        Some(backend) => backend.run(&snapshots, sql),
        None => Err(CoreError::Unsupported("no query backend configured for this build".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::ReadMode;
    use crate::core::operations;
    use crate::core::plan::Operation;

    fn sample_workbook() -> (tempfile::TempDir, WorkbookContext) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.xlsx");
        WorkbookContext::create(&path, &["Sheet1".to_string()], false).unwrap();
        let mut ctx = WorkbookContext::load(&path, ReadMode::Formula).unwrap();
        operations::apply(
            &mut ctx,
            &Operation::TableCreate {
                op_id: "op1".into(),
                name: "Orders".into(),
                sheet: "Sheet1".into(),
                reference: "A1:B3".into(),
                headers: Some(vec!["Id".into(), "Qty".into()]),
            },
        )
        .unwrap();
        operations::apply(
            &mut ctx,
            &Operation::CellSet {
                op_id: "op2".into(),
                reference: "Sheet1!A2".into(),
                value: serde_json::json!(1),
                cell_type: None,
                force_overwrite_formulas: false,
            },
        )
        .unwrap();
        operations::apply(
            &mut ctx,
            &Operation::CellSet {
                op_id: "op3".into(),
                reference: "Sheet1!B2".into(),
                value: serde_json::json!(5),
                cell_type: None,
                force_overwrite_formulas: false,
            },
        )
        .unwrap();
        (dir, ctx)
    }

    #[test]
    fn snapshot_materializes_table_rows() {
        let (_dir, ctx) = sample_workbook();
        let snapshots = build_snapshots(&ctx);
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].name, "Orders");
        assert_eq!(snapshots[0].columns, vec!["Id".to_string(), "Qty".to_string()]);
        assert_eq!(snapshots[0].rows[0].get("Id"), Some(&serde_json::json!(1)));
        assert_eq!(snapshots[0].rows[0].get("Qty"), Some(&serde_json::json!(5)));
    }

    #[test]
    fn run_query_without_backend_is_unsupported() {
        let (_dir, ctx) = sample_workbook();
        let err = run_query(&ctx, "select 1", None).unwrap_err();
        assert_eq!(err.code(), "ERR_UNSUPPORTED");
    }
}
