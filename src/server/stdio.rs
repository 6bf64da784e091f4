//! Blocking line-delimited JSON stdio server: one JSON request object per
//! line in, one JSON response object per line out. Grounded on
//! `xl.server.stdio.StdioServer`.

use crate::cli::commands::{cell, diff as diff_cmd, formula, query, sheet, table, wb};
use crate::core::errors::CoreError;
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

const SUPPORTED_COMMANDS: &[&str] = &[
    "version",
    "guide",
    "close",
    "wb.inspect",
    "sheet.ls",
    "table.ls",
    "cell.get",
    "cell.set",
    "query",
    "formula.find",
    "formula.lint",
    "validate.workbook",
    "diff.compare",
];

fn arg_str(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(Value::as_str).map(str::to_string)
}

fn arg_file(args: &Value) -> Result<PathBuf, CoreError> {
    match arg_str(args, "file") {
        Some(f) if !f.is_empty() => Ok(PathBuf::from(f)),
        _ => Err(CoreError::MissingParam("file".to_string())),
    }
}

/// Every request reopens its workbook fresh — this binary carries no
/// cross-request context cache, unlike the per-`(file, data_only)` cache
/// the system this is grounded on keeps (see DESIGN.md).
fn handle(command: &str, args: &Value) -> Result<Value, CoreError> {
    match command {
        "version" => Ok(json!({ "version": env!("CARGO_PKG_VERSION") })),
        "guide" => Ok(json!({
            "supported_commands": SUPPORTED_COMMANDS,
            "protocol": "JSON line-delimited over stdin/stdout",
        })),
        "wb.inspect" => wb::inspect(&arg_file(args)?),
        "sheet.ls" => sheet::ls(&arg_file(args)?),
        "table.ls" => table::ls(&arg_file(args)?),
        "cell.get" => {
            let file = arg_file(args)?;
            let reference = arg_str(args, "ref").ok_or_else(|| CoreError::MissingParam("ref".to_string()))?;
            cell::get(&file, &reference)
        }
        "cell.set" => {
            let file = arg_file(args)?;
            let reference = arg_str(args, "ref").ok_or_else(|| CoreError::MissingParam("ref".to_string()))?;
            let value = args.get("value").cloned().unwrap_or(Value::Null);
            cell::set(&file, reference, value, None, false, false, false, None)
        }
        "query" => {
            let file = arg_file(args)?;
            let sql = arg_str(args, "sql").unwrap_or_default();
            query::run(&file, &sql)
        }
        "formula.find" => {
            let file = arg_file(args)?;
            let pattern = arg_str(args, "pattern").unwrap_or_default();
            formula::find(&file, &pattern, arg_str(args, "sheet"))
        }
        "formula.lint" => {
            let file = arg_file(args)?;
            formula::lint(&file, arg_str(args, "sheet"))
        }
        "validate.workbook" => {
            let file = arg_file(args)?;
            wb::inspect(&file).map(|meta| json!({ "warnings": meta.get("warnings").cloned().unwrap_or(json!([])) }))
        }
        "diff.compare" => {
            let file = arg_file(args)?;
            let file_b = arg_str(args, "file_b").ok_or_else(|| CoreError::MissingParam("file_b".to_string()))?;
            diff_cmd::run(&file, &PathBuf::from(file_b), arg_str(args, "sheet"), false)
        }
        other => Err(CoreError::Usage(format!("unknown command: {other}"))),
    }
}

/// Reads JSON-line requests from stdin until EOF or a `close` command. The
/// loop always writes exactly one JSON-line response per request.
pub fn serve() -> io::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let request: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                writeln!(stdout, "{}", json!({ "ok": false, "error": format!("invalid JSON: {e}") }))?;
                stdout.flush()?;
                continue;
            }
        };

        let id = request.get("id").cloned().unwrap_or(Value::String(String::new()));
        let command = request.get("command").and_then(Value::as_str).unwrap_or("").to_string();
        let args = request.get("args").cloned().unwrap_or_else(|| json!({}));

        if command == "close" {
            writeln!(stdout, "{}", json!({ "id": id, "ok": true, "result": "closed" }))?;
            stdout.flush()?;
            break;
        }

        let response = match handle(&command, &args) {
            Ok(result) => json!({ "id": id, "ok": true, "result": result }),
            Err(err) => json!({ "id": id, "ok": false, "error": { "code": err.code(), "message": err.to_string() } }),
        };
        writeln!(stdout, "{}", response)?;
        stdout.flush()?;
    }

    Ok(())
}
