//! The closed Operation Engine: one pure function per operation variant,
//! `(context, op) -> ChangeRecord | CoreError`. Operations mutate only the
//! in-memory model; persistence is the executor's job.

use crate::core::errors::CoreError;
use crate::core::model::{ChangeRecord, Impact};
use crate::core::plan::Operation;
use crate::core::reference::{self, Reference};
use crate::core::workbook::WorkbookContext;
use serde_json::{json, Value};
use umya_spreadsheet::NumberingFormat;

pub fn apply(ctx: &mut WorkbookContext, op: &Operation) -> Result<ChangeRecord, CoreError> {
    match op {
        Operation::CellSet { op_id, reference, value, cell_type, force_overwrite_formulas } => {
            cell_set(ctx, op_id, reference, value, cell_type.as_deref(), *force_overwrite_formulas)
        }
        Operation::RangeClear { op_id, reference, clear_contents, clear_formats } => {
            range_clear(ctx, op_id, reference, *clear_contents, *clear_formats)
        }
        Operation::FormulaSet { op_id, reference, formula, fill_mode, force_overwrite_values, force_overwrite_formulas } => {
            formula_set(
                ctx,
                op_id,
                reference,
                formula,
                fill_mode.as_deref().unwrap_or("relative"),
                *force_overwrite_values,
                *force_overwrite_formulas,
            )
        }
        Operation::FormatNumber { op_id, reference, style, decimals } => {
            format_number(ctx, op_id, reference, style, decimals.unwrap_or(2))
        }
        Operation::FormatWidth { op_id, sheet, columns, width } => {
            format_width(ctx, op_id, sheet, columns, *width)
        }
        Operation::FormatFreeze { op_id, sheet, at, unfreeze } => {
            format_freeze(ctx, op_id, sheet, at.as_deref(), *unfreeze)
        }
        Operation::SheetCreate { op_id, name, position } => sheet_create(ctx, op_id, name, *position),
        Operation::SheetRename { op_id, old_name, new_name } => sheet_rename(ctx, op_id, old_name, new_name),
        Operation::SheetDelete { op_id, name } => sheet_delete(ctx, op_id, name),
        Operation::TableCreate { op_id, sheet, name, reference, headers } => {
            table_create(ctx, op_id, sheet, name, reference, headers.as_deref())
        }
        Operation::TableAddColumn { op_id, table, name, formula, default_value } => {
            table_add_column(ctx, op_id, table, name, formula.as_deref(), default_value.as_ref())
        }
        Operation::TableDeleteColumn { op_id, table, name } => table_delete_column(ctx, op_id, table, name),
        Operation::TableDelete { op_id, table } => table_delete(ctx, op_id, table),
        Operation::TableAppendRows { op_id, table, rows, schema_mode } => {
            table_append_rows(ctx, op_id, table, rows, schema_mode)
        }
    }
}

fn sheet_and_addr<'a>(reference_text: &'a str, default_sheet: Option<&'a str>) -> Result<(Option<String>, String), CoreError> {
    match reference::parse_reference(reference_text)? {
        Reference::Cell { sheet, row, col } => Ok((sheet.or_else(|| default_sheet.map(String::from)), reference::cell_address(row, col))),
        _ => Err(CoreError::RangeInvalid(format!("{reference_text} is not a single cell"))),
    }
}

fn resolve_range(ctx: &WorkbookContext, reference_text: &str) -> Result<(String, u32, u32, u32, u32), CoreError> {
    match reference::parse_reference(reference_text)? {
        Reference::Cell { sheet, row, col } => {
            let sheet = sheet.ok_or_else(|| CoreError::RangeInvalid("reference needs a sheet qualifier".into()))?;
            Ok((sheet, row, col, row, col))
        }
        Reference::Range { sheet, min_row, min_col, max_row, max_col } => {
            let sheet = sheet.ok_or_else(|| CoreError::RangeInvalid("reference needs a sheet qualifier".into()))?;
            Ok((sheet, min_row, min_col, max_row, max_col))
        }
        Reference::TableColumn { table, column, include_header } => {
            let (sheet, meta) = ctx
                .find_table(&table)
                .ok_or_else(|| CoreError::TableNotFound(table.clone()))?;
            let col_idx = meta
                .columns
                .iter()
                .position(|c| c.name == column)
                .ok_or_else(|| CoreError::ColumnNotFound(column.clone()))?;
            let col = meta.reference.min_col + col_idx as u32;
            let data_min_row = meta.reference.min_row + 1;
            if !include_header && data_min_row > meta.reference.max_row {
                return Err(CoreError::RangeInvalid(format!("{table}[{column}] has no data rows")));
            }
            let min_row = if include_header { meta.reference.min_row } else { data_min_row };
            Ok((sheet, min_row, col, meta.reference.max_row, col))
        }
    }
}

fn cell_set(
    ctx: &mut WorkbookContext,
    op_id: &str,
    reference_text: &str,
    value: &Value,
    cell_type: Option<&str>,
    force_overwrite_formulas: bool,
) -> Result<ChangeRecord, CoreError> {
    let (sheet, addr) = sheet_and_addr(reference_text, None)?;
    let sheet_name = sheet.ok_or_else(|| CoreError::RangeInvalid("cell.set requires a sheet qualifier".into()))?;
    let sheet = ctx
        .book_mut()
        .get_sheet_by_name_mut(&sheet_name)
        .ok_or_else(|| CoreError::SheetNotFound(sheet_name.clone()))?;

    let cell = sheet.get_cell_mut(addr.as_str());
    let before = if cell.is_formula() { Some(json!(cell.get_formula())) } else { Some(json!(cell.get_value().to_string())) };

    if cell.is_formula() && !force_overwrite_formulas {
        return Err(CoreError::FormulaOverwriteBlocked);
    }

    match cell_type {
        Some("number") => {
            let n = value.as_f64().ok_or_else(|| CoreError::InvalidArgument(format!("{value} is not a number")))?;
            cell.set_value_number(n);
        }
        Some("bool") => {
            let b = value.as_bool().ok_or_else(|| CoreError::InvalidArgument(format!("{value} is not a bool")))?;
            cell.set_value(if b { "TRUE" } else { "FALSE" });
        }
        Some("date") => {
            let text = value.as_str().ok_or_else(|| CoreError::InvalidArgument("date value must be text".into()))?;
            cell.set_value(text);
            sheet
                .get_style_mut(addr.as_str())
                .get_number_format_mut()
                .set_format_code("YYYY-MM-DD");
        }
        _ => match value {
            Value::Number(n) => cell.set_value_number(n.as_f64().unwrap_or_default()),
            Value::Bool(b) => cell.set_value(if *b { "TRUE" } else { "FALSE" }),
            Value::String(s) => cell.set_value(s.clone()),
            Value::Null => cell.set_value(""),
            other => cell.set_value(other.to_string()),
        },
    }

    Ok(ChangeRecord {
        op_id: op_id.to_string(),
        kind: "cell.set".to_string(),
        target: format!("{sheet_name}!{addr}"),
        before,
        after: Some(json!(value)),
        impact: Impact { cells: Some(1), rows: None },
        warnings: Vec::new(),
    })
}

fn range_clear(
    ctx: &mut WorkbookContext,
    op_id: &str,
    reference_text: &str,
    clear_contents: bool,
    clear_formats: bool,
) -> Result<ChangeRecord, CoreError> {
    let (sheet_name, min_row, min_col, max_row, max_col) = resolve_range(ctx, reference_text)?;
    let sheet = ctx
        .book_mut()
        .get_sheet_by_name_mut(&sheet_name)
        .ok_or_else(|| CoreError::SheetNotFound(sheet_name.clone()))?;

    let mut cells = 0u32;
    for row in min_row..=max_row {
        for col in min_col..=max_col {
            let addr = reference::cell_address(row, col);
            if clear_contents {
                sheet.get_cell_mut(addr.as_str()).set_value("");
            }
            if clear_formats {
                *sheet.get_style_mut(addr.as_str()) = umya_spreadsheet::Style::default();
            }
            cells += 1;
        }
    }

    Ok(ChangeRecord {
        op_id: op_id.to_string(),
        kind: "range.clear".to_string(),
        target: format!("{sheet_name}!{reference_text}"),
        before: None,
        after: None,
        impact: Impact { cells: Some(cells), rows: None },
        warnings: Vec::new(),
    })
}

fn formula_set(
    ctx: &mut WorkbookContext,
    op_id: &str,
    reference_text: &str,
    base_formula: &str,
    fill_mode: &str,
    force_overwrite_values: bool,
    force_overwrite_formulas: bool,
) -> Result<ChangeRecord, CoreError> {
    let (sheet_name, min_row, min_col, max_row, max_col) = resolve_range(ctx, reference_text)?;
    let sheet = ctx
        .book_mut()
        .get_sheet_by_name_mut(&sheet_name)
        .ok_or_else(|| CoreError::SheetNotFound(sheet_name.clone()))?;

    let mut warnings = Vec::new();
    let mut advanced = 0u32;
    let total = (max_row - min_row + 1) * (max_col - min_col + 1);

    for row in min_row..=max_row {
        for col in min_col..=max_col {
            let addr = reference::cell_address(row, col);
            let cell = sheet.get_cell_mut(addr.as_str());
            let blocked_by_value = !cell.is_formula() && !cell.get_value().is_empty() && !force_overwrite_values;
            let blocked_by_formula = cell.is_formula() && !force_overwrite_formulas;
            if blocked_by_value || blocked_by_formula {
                warnings.push(format!("WARN_FORMULA_SET_SKIPPED: {sheet_name}!{addr} already occupied"));
                continue;
            }

            let formula = if fill_mode == "relative" {
                let delta_row = row as i64 - min_row as i64;
                let delta_col = col as i64 - min_col as i64;
                reference::shift_formula(base_formula, delta_row, delta_col)
            } else {
                base_formula.to_string()
            };

            cell.set_formula(formula.trim_start_matches('=').to_string());
            advanced += 1;
        }
    }

    if advanced == 0 {
        return Err(CoreError::FormulaBlocked(format!(
            "all {total} targeted cells in {reference_text} were blocked"
        )));
    }

    Ok(ChangeRecord {
        op_id: op_id.to_string(),
        kind: "formula.set".to_string(),
        target: format!("{sheet_name}!{reference_text}"),
        before: None,
        after: Some(json!(base_formula)),
        impact: Impact { cells: Some(advanced), rows: None },
        warnings,
    })
}

fn format_number(
    ctx: &mut WorkbookContext,
    op_id: &str,
    reference_text: &str,
    style: &str,
    decimals: u32,
) -> Result<ChangeRecord, CoreError> {
    let code = number_format_code(style, decimals)?;
    let (sheet_name, min_row, min_col, max_row, max_col) = resolve_range(ctx, reference_text)?;
    let sheet = ctx
        .book_mut()
        .get_sheet_by_name_mut(&sheet_name)
        .ok_or_else(|| CoreError::SheetNotFound(sheet_name.clone()))?;

    let mut cells = 0u32;
    for row in min_row..=max_row {
        for col in min_col..=max_col {
            let addr = reference::cell_address(row, col);
            sheet
                .get_style_mut(addr.as_str())
                .get_number_format_mut()
                .set_format_code(code.as_str());
            cells += 1;
        }
    }

    Ok(ChangeRecord {
        op_id: op_id.to_string(),
        kind: "format.number".to_string(),
        target: format!("{sheet_name}!{reference_text}"),
        before: None,
        after: Some(json!(code)),
        impact: Impact { cells: Some(cells), rows: None },
        warnings: Vec::new(),
    })
}

fn number_format_code(style: &str, decimals: u32) -> Result<String, CoreError> {
    let zeros = "0".repeat(decimals as usize);
    let decimal_part = if decimals == 0 { String::new() } else { format!(".{zeros}") };
    Ok(match style {
        "number" => format!("#,##0{decimal_part}"),
        "percent" => format!("0{decimal_part}%"),
        "currency" => format!("$#,##0{decimal_part}"),
        "date" => NumberingFormat::FORMAT_DATE_YYYYMMDD2.to_string(),
        "text" => "@".to_string(),
        other => return Err(CoreError::InvalidArgument(format!("unknown format.number style: {other}"))),
    })
}

fn format_width(
    ctx: &mut WorkbookContext,
    op_id: &str,
    sheet: &str,
    columns: &[String],
    width: f64,
) -> Result<ChangeRecord, CoreError> {
    let ws = ctx
        .book_mut()
        .get_sheet_by_name_mut(sheet)
        .ok_or_else(|| CoreError::SheetNotFound(sheet.to_string()))?;

    for letters in columns {
        if !letters.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CoreError::RangeInvalid(format!(
                "format.width accepts column letters only, got {letters}"
            )));
        }
        let idx = reference::col_from_letters(letters);
        ws.get_column_dimension_by_number_mut(&idx).set_width(width);
    }

    Ok(ChangeRecord {
        op_id: op_id.to_string(),
        kind: "format.width".to_string(),
        target: format!("{sheet}!{}", columns.join(",")),
        before: None,
        after: Some(json!(width)),
        impact: Impact { cells: Some(columns.len() as u32), rows: None },
        warnings: Vec::new(),
    })
}

fn format_freeze(
    ctx: &mut WorkbookContext,
    op_id: &str,
    sheet: &str,
    at: Option<&str>,
    unfreeze: bool,
) -> Result<ChangeRecord, CoreError> {
    let ws = ctx
        .book_mut()
        .get_sheet_by_name_mut(sheet)
        .ok_or_else(|| CoreError::SheetNotFound(sheet.to_string()))?;

    if unfreeze {
        ws.get_sheet_views_mut().get_sheet_view_list_mut().clear();
        return Ok(ChangeRecord {
            op_id: op_id.to_string(),
            kind: "format.freeze".to_string(),
            target: sheet.to_string(),
            before: None,
            after: Some(json!("unfrozen")),
            impact: Impact::default(),
            warnings: Vec::new(),
        });
    }

    let at = at.ok_or_else(|| CoreError::MissingParam("at".to_string()))?;
    let (row, col) = match reference::parse_reference(at)? {
        Reference::Cell { row, col, .. } => (row, col),
        _ => return Err(CoreError::InvalidArgument(format!("{at} is not a single cell"))),
    };

    let views = ws.get_sheet_views_mut().get_sheet_view_list_mut();
    if views.is_empty() {
        let mut view = umya_spreadsheet::SheetView::default();
        view.set_workbook_view_id(0);
        views.push(view);
    }
    let view = &mut views[0];

    let mut coord = umya_spreadsheet::Coordinate::default();
    coord.set_coordinate(at);

    let mut pane = umya_spreadsheet::Pane::default();
    if col > 1 {
        pane.set_horizontal_split((col - 1) as f64);
    }
    if row > 1 {
        pane.set_vertical_split((row - 1) as f64);
    }
    pane.set_top_left_cell(coord);
    pane.set_state(umya_spreadsheet::PaneStateValues::Frozen);
    view.set_pane(pane);

    Ok(ChangeRecord {
        op_id: op_id.to_string(),
        kind: "format.freeze".to_string(),
        target: format!("{sheet}!{at}"),
        before: None,
        after: Some(json!(at)),
        impact: Impact::default(),
        warnings: Vec::new(),
    })
}

fn sheet_create(ctx: &mut WorkbookContext, op_id: &str, name: &str, position: Option<usize>) -> Result<ChangeRecord, CoreError> {
    if ctx.book().get_sheet_by_name(name).is_some() {
        return Err(CoreError::SheetExists(name.to_string()));
    }
    ctx.book_mut()
        .new_sheet(name.to_string())
        .map_err(|e| CoreError::Internal(e.to_string()))?;

    if let Some(pos) = position {
        let sheets = ctx.book_mut().get_sheet_collection_mut();
        if let Some(idx) = sheets.iter().position(|s| s.get_name() == name) {
            let sheet = sheets.remove(idx);
            let pos = pos.min(sheets.len());
            sheets.insert(pos, sheet);
        }
    }

    Ok(ChangeRecord {
        op_id: op_id.to_string(),
        kind: "sheet.create".to_string(),
        target: name.to_string(),
        before: None,
        after: Some(json!(name)),
        impact: Impact::default(),
        warnings: Vec::new(),
    })
}

fn sheet_rename(ctx: &mut WorkbookContext, op_id: &str, old_name: &str, new_name: &str) -> Result<ChangeRecord, CoreError> {
    if ctx.book().get_sheet_by_name(new_name).is_some() {
        return Err(CoreError::SheetExists(new_name.to_string()));
    }
    let sheet = ctx
        .book_mut()
        .get_sheet_by_name_mut(old_name)
        .ok_or_else(|| CoreError::SheetNotFound(old_name.to_string()))?;
    sheet.set_name(new_name.to_string());

    Ok(ChangeRecord {
        op_id: op_id.to_string(),
        kind: "sheet.rename".to_string(),
        target: old_name.to_string(),
        before: Some(json!(old_name)),
        after: Some(json!(new_name)),
        impact: Impact::default(),
        warnings: Vec::new(),
    })
}

fn sheet_delete(ctx: &mut WorkbookContext, op_id: &str, name: &str) -> Result<ChangeRecord, CoreError> {
    if ctx.book().get_sheet_by_name(name).is_none() {
        return Err(CoreError::SheetNotFound(name.to_string()));
    }
    if ctx.book().get_sheet_collection().len() <= 1 {
        return Err(CoreError::LastSheet);
    }
    ctx.book_mut()
        .remove_sheet_by_name(name)
        .map_err(|e| CoreError::Internal(e.to_string()))?;

    Ok(ChangeRecord {
        op_id: op_id.to_string(),
        kind: "sheet.delete".to_string(),
        target: name.to_string(),
        before: Some(json!(name)),
        after: None,
        impact: Impact::default(),
        warnings: Vec::new(),
    })
}

static TABLE_NAME_RE: once_cell::sync::Lazy<regex::Regex> =
    once_cell::sync::Lazy::new(|| regex::Regex::new(r"^[A-Za-z_]\w*$").unwrap());

fn table_create(
    ctx: &mut WorkbookContext,
    op_id: &str,
    sheet: &str,
    name: &str,
    reference_text: &str,
    headers: Option<&[String]>,
) -> Result<ChangeRecord, CoreError> {
    if !TABLE_NAME_RE.is_match(name) {
        return Err(CoreError::InvalidArgument(format!("table name {name} does not match ^[A-Za-z_]\\w*$")));
    }
    if ctx.find_table(name).is_some() {
        return Err(CoreError::TableExists(name.to_string()));
    }

    let (min_row, min_col, max_row, max_col) = match reference::parse_reference(reference_text)? {
        Reference::Range { min_row, min_col, max_row, max_col, .. } => (min_row, min_col, max_row, max_col),
        Reference::Cell { row, col, .. } => (row, col, row, col),
        Reference::TableColumn { .. } => {
            return Err(CoreError::InvalidArgument("table.create requires an A1 range".to_string()))
        }
    };

    for existing in ctx.list_tables().iter().filter(|t| t.sheet == sheet) {
        let overlaps = min_row <= existing.reference.max_row
            && max_row >= existing.reference.min_row
            && min_col <= existing.reference.max_col
            && max_col >= existing.reference.min_col;
        if overlaps {
            return Err(CoreError::TableOverlap(format!("{name} overlaps existing table {}", existing.name)));
        }
    }

    let ws = ctx
        .book_mut()
        .get_sheet_by_name_mut(sheet)
        .ok_or_else(|| CoreError::SheetNotFound(sheet.to_string()))?;

    if let Some(headers) = headers {
        for (i, header) in headers.iter().enumerate() {
            let addr = reference::cell_address(min_row, min_col + i as u32);
            ws.get_cell_mut(addr.as_str()).set_value(header.clone());
        }
    } else {
        for col in min_col..=max_col {
            let addr = reference::cell_address(min_row, col);
            if ws.get_cell(addr.as_str()).map(|c| c.get_value().is_empty()).unwrap_or(true) {
                return Err(CoreError::InvalidArgument(
                    "table.create header row is empty and no headers were provided".to_string(),
                ));
            }
        }
    }

    let start = reference::cell_address(min_row, min_col);
    let end = reference::cell_address(max_row, max_col);
    let table = umya_spreadsheet::structs::Table::new(name, (start.as_str(), end.as_str()));
    ws.add_table(table);

    Ok(ChangeRecord {
        op_id: op_id.to_string(),
        kind: "table.create".to_string(),
        target: format!("{sheet}!{name}"),
        before: None,
        after: Some(json!(reference_text)),
        impact: Impact { cells: None, rows: Some(max_row.saturating_sub(min_row)) },
        warnings: Vec::new(),
    })
}

fn table_add_column(
    ctx: &mut WorkbookContext,
    op_id: &str,
    table: &str,
    name: &str,
    formula: Option<&str>,
    default_value: Option<&Value>,
) -> Result<ChangeRecord, CoreError> {
    let (sheet_name, meta) = ctx.find_table(table).ok_or_else(|| CoreError::TableNotFound(table.to_string()))?;
    if meta.has_column_case_folded(name) {
        return Err(CoreError::ColumnExists(name.to_string()));
    }

    let new_col = meta.reference.max_col + 1;
    let header_addr = reference::cell_address(meta.reference.min_row, new_col);
    let data_rows = meta.row_count();

    let ws = ctx
        .book_mut()
        .get_sheet_by_name_mut(&sheet_name)
        .ok_or_else(|| CoreError::SheetNotFound(sheet_name.clone()))?;
    ws.get_cell_mut(header_addr.as_str()).set_value(name.to_string());

    for i in 1..=data_rows {
        let row = meta.reference.min_row + i;
        let addr = reference::cell_address(row, new_col);
        let cell = ws.get_cell_mut(addr.as_str());
        if let Some(f) = formula {
            let shifted = reference::shift_formula(f, i as i64 - 1, 0);
            cell.set_formula(shifted.trim_start_matches('=').to_string());
        } else if let Some(v) = default_value {
            match v {
                Value::Number(n) => cell.set_value_number(n.as_f64().unwrap_or_default()),
                Value::String(s) => cell.set_value(s.clone()),
                Value::Bool(b) => cell.set_value(if *b { "TRUE" } else { "FALSE" }),
                _ => {}
            }
        }
    }

    if let Some(ws_table) = ws.get_tables_mut().iter_mut().find(|t| t.get_name() == table) {
        let end_col_letters = reference::col_to_letters(new_col);
        let (start, _end) = ws_table.get_area();
        let start = start.to_string();
        let new_end = format!("{end_col_letters}{}", meta.reference.max_row);
        ws_table.set_area((start.as_str(), new_end.as_str()));
    }

    Ok(ChangeRecord {
        op_id: op_id.to_string(),
        kind: "table.add_column".to_string(),
        target: format!("{table}[{name}]"),
        before: None,
        after: Some(json!(name)),
        impact: Impact { cells: Some(data_rows), rows: Some(data_rows) },
        warnings: Vec::new(),
    })
}

fn table_delete_column(ctx: &mut WorkbookContext, op_id: &str, table: &str, name: &str) -> Result<ChangeRecord, CoreError> {
    let (sheet_name, meta) = ctx.find_table(table).ok_or_else(|| CoreError::TableNotFound(table.to_string()))?;
    let col_idx = meta
        .columns
        .iter()
        .position(|c| c.name == name)
        .ok_or_else(|| CoreError::ColumnNotFound(name.to_string()))?;
    let target_col = meta.reference.min_col + col_idx as u32;

    let ws = ctx
        .book_mut()
        .get_sheet_by_name_mut(&sheet_name)
        .ok_or_else(|| CoreError::SheetNotFound(sheet_name.clone()))?;

    for row in meta.reference.min_row..=meta.reference.max_row {
        for col in target_col..meta.reference.max_col {
            let src = reference::cell_address(row, col + 1);
            let dst = reference::cell_address(row, col);
            let value = ws.get_cell(src.as_str()).map(|c| c.get_value().to_string()).unwrap_or_default();
            let is_formula = ws.get_cell(src.as_str()).map(|c| c.is_formula()).unwrap_or(false);
            let formula = ws.get_cell(src.as_str()).map(|c| c.get_formula().to_string()).unwrap_or_default();
            let dst_cell = ws.get_cell_mut(dst.as_str());
            if is_formula {
                dst_cell.set_formula(formula);
            } else {
                dst_cell.set_value(value);
            }
        }
        let last = reference::cell_address(row, meta.reference.max_col);
        ws.get_cell_mut(last.as_str()).set_value("");
    }

    if let Some(ws_table) = ws.get_tables_mut().iter_mut().find(|t| t.get_name() == table) {
        let new_max_col = meta.reference.max_col.saturating_sub(1).max(meta.reference.min_col);
        let (start, _) = ws_table.get_area();
        let start = start.to_string();
        let new_end = format!("{}{}", reference::col_to_letters(new_max_col), meta.reference.max_row);
        ws_table.set_area((start.as_str(), new_end.as_str()));
    }

    Ok(ChangeRecord {
        op_id: op_id.to_string(),
        kind: "table.delete_column".to_string(),
        target: format!("{table}[{name}]"),
        before: Some(json!(name)),
        after: None,
        impact: Impact { cells: Some(meta.row_count()), rows: None },
        warnings: Vec::new(),
    })
}

fn table_delete(ctx: &mut WorkbookContext, op_id: &str, table: &str) -> Result<ChangeRecord, CoreError> {
    let (sheet_name, _meta) = ctx.find_table(table).ok_or_else(|| CoreError::TableNotFound(table.to_string()))?;
    let ws = ctx
        .book_mut()
        .get_sheet_by_name_mut(&sheet_name)
        .ok_or_else(|| CoreError::SheetNotFound(sheet_name.clone()))?;
    ws.get_tables_mut().retain(|t| t.get_name() != table);

    Ok(ChangeRecord {
        op_id: op_id.to_string(),
        kind: "table.delete".to_string(),
        target: table.to_string(),
        before: Some(json!(table)),
        after: None,
        impact: Impact::default(),
        warnings: Vec::new(),
    })
}

fn table_append_rows(
    ctx: &mut WorkbookContext,
    op_id: &str,
    table: &str,
    rows: &[serde_json::Map<String, Value>],
    schema_mode: &str,
) -> Result<ChangeRecord, CoreError> {
    let (sheet_name, meta) = ctx.find_table(table).ok_or_else(|| CoreError::TableNotFound(table.to_string()))?;

    for row in rows {
        validate_row_schema(&meta, row, schema_mode)?;
    }

    let ws = ctx
        .book_mut()
        .get_sheet_by_name_mut(&sheet_name)
        .ok_or_else(|| CoreError::SheetNotFound(sheet_name.clone()))?;

    let mut next_row = meta.reference.max_row + 1;
    for (offset, row) in rows.iter().enumerate() {
        for (col_idx, column) in meta.columns.iter().enumerate() {
            let col = meta.reference.min_col + col_idx as u32;
            let addr = reference::cell_address(next_row, col);
            let cell = ws.get_cell_mut(addr.as_str());

            let found = find_row_value(row, &column.name, schema_mode);
            match (found, &column.formula_template) {
                (Some(v), _) => write_scalar(cell, v),
                (None, Some(template)) => {
                    let shifted = reference::shift_formula(template, offset as i64 + 1, 0);
                    cell.set_formula(shifted.trim_start_matches('=').to_string());
                }
                (None, None) => cell.set_value(""),
            }
        }
        next_row += 1;
    }

    let new_max_row = meta.reference.max_row + rows.len() as u32;
    if let Some(ws_table) = ws.get_tables_mut().iter_mut().find(|t| t.get_name() == table) {
        let (start, _) = ws_table.get_area();
        let start = start.to_string();
        let end_col = reference::col_to_letters(meta.reference.max_col);
        let new_end = format!("{end_col}{new_max_row}");
        ws_table.set_area((start.as_str(), new_end.as_str()));
    }

    Ok(ChangeRecord {
        op_id: op_id.to_string(),
        kind: "table.append_rows".to_string(),
        target: table.to_string(),
        before: Some(json!(meta.row_count())),
        after: Some(json!(meta.row_count() + rows.len() as u32)),
        impact: Impact { cells: Some(rows.len() as u32 * meta.columns.len() as u32), rows: Some(rows.len() as u32) },
        warnings: Vec::new(),
    })
}

fn find_row_value<'a>(row: &'a serde_json::Map<String, Value>, column: &str, schema_mode: &str) -> Option<&'a Value> {
    if schema_mode == "map-by-header" {
        row.iter().find(|(k, _)| k.eq_ignore_ascii_case(column)).map(|(_, v)| v)
    } else {
        row.get(column)
    }
}

fn write_scalar(cell: &mut umya_spreadsheet::Cell, value: &Value) {
    match value {
        Value::Number(n) => cell.set_value_number(n.as_f64().unwrap_or_default()),
        Value::Bool(b) => cell.set_value(if *b { "TRUE" } else { "FALSE" }),
        Value::String(s) => cell.set_value(s.clone()),
        Value::Null => cell.set_value(""),
        other => cell.set_value(other.to_string()),
    }
}

fn validate_row_schema(
    meta: &crate::core::model::TableMeta,
    row: &serde_json::Map<String, Value>,
    schema_mode: &str,
) -> Result<(), CoreError> {
    let column_names: Vec<&str> = meta.columns.iter().map(|c| c.name.as_str()).collect();

    let key_matches = |key: &str, name: &str| {
        if schema_mode == "map-by-header" {
            key.eq_ignore_ascii_case(name)
        } else {
            key == name
        }
    };

    for key in row.keys() {
        if !column_names.iter().any(|name| key_matches(key, name)) {
            return Err(CoreError::SchemaMismatch(format!("unknown column '{key}' in append_rows row")));
        }
    }

    if schema_mode == "strict" {
        for column in &meta.columns {
            let present = row.keys().any(|k| key_matches(k, &column.name));
            if !present && !column.is_formula {
                return Err(CoreError::SchemaMismatch(format!(
                    "missing required column '{}' in append_rows row",
                    column.name
                )));
            }
        }
    }

    Ok(())
}
