use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

pub fn bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_xlpatch"))
}

pub fn run(args: &[&str]) -> (i32, serde_json::Value) {
    let output = Command::new(bin()).args(args).output().expect("spawn xlpatch");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().filter(|l| !l.trim().is_empty()).collect();
    assert!(!lines.is_empty(), "expected at least one JSON line on stdout, got: {stdout:?}");
    let envelope: serde_json::Value = serde_json::from_str(&lines.join("\n")).unwrap_or_else(|_| {
        serde_json::from_str(lines[0]).expect("stdout is a single JSON envelope")
    });
    (output.status.code().unwrap_or(-1), envelope)
}

/// A 4-row sales workbook: `Sheet1!A1:D5` holding headers
/// `Region, Product, Sales, Cost` plus four data rows.
pub fn sales_fixture(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("sales.xlsx");
    let mut wb = umya_spreadsheet::new_file();
    let sheet = wb.get_sheet_by_name_mut("Sheet1").expect("default sheet exists");

    let cols = ["A", "B", "C", "D"];
    for (col, header) in cols.iter().zip(["Region", "Product", "Sales", "Cost"]) {
        sheet.get_cell_mut(format!("{col}1").as_str()).set_value(header);
    }
    let rows: [[&str; 4]; 4] = [
        ["East", "Widget", "100", "40"],
        ["West", "Widget", "150", "60"],
        ["East", "Gadget", "200", "90"],
        ["West", "Gadget", "120", "50"],
    ];
    for (r, row) in rows.iter().enumerate() {
        let excel_row = r + 2;
        for (col, value) in cols.iter().zip(row.iter()) {
            let addr = format!("{col}{excel_row}");
            let cell = sheet.get_cell_mut(addr.as_str());
            if *col == "A" || *col == "B" {
                cell.set_value(*value);
            } else {
                cell.set_value_number(value.parse::<f64>().unwrap());
            }
        }
    }

    umya_spreadsheet::writer::xlsx::write(&wb, &path).expect("write fixture workbook");
    path
}

pub fn create_sales_table(file: &Path) {
    let (code, env) = run(&[
        "table",
        "create",
        file.to_str().unwrap(),
        "--sheet",
        "Sheet1",
        "--name",
        "Sales",
        "--ref",
        "Sheet1!A1:D5",
    ]);
    assert_eq!(code, 0, "table create failed: {env}");
}
