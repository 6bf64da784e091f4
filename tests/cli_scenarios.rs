//! End-to-end scenarios over the built binary, one per documented testable
//! property. Every command is invoked as a real child process so the test
//! exercises the exact stdout contract a caller sees.

mod support;

use fs4::FileExt;
use sha2::{Digest, Sha256};
use std::fs::OpenOptions;
use support::{create_sales_table, run, sales_fixture};

fn sha256_file(path: &std::path::Path) -> Vec<u8> {
    let bytes = std::fs::read(path).unwrap();
    Sha256::digest(&bytes).to_vec()
}

#[test]
fn add_column_dry_run_then_apply_with_backup() {
    let dir = tempfile::tempdir().unwrap();
    let file = sales_fixture(&dir);
    create_sales_table(&file);

    let before_hash = sha256_file(&file);

    let (code, env) = run(&[
        "table",
        "add-column",
        file.to_str().unwrap(),
        "--table",
        "Sales",
        "--name",
        "Margin",
        "--formula",
        "=[@Sales]-[@Cost]",
        "--dry-run",
    ]);
    assert_eq!(code, 0, "dry run failed: {env}");
    assert_eq!(env["ok"], true);
    let changes = env["result"]["changes"].as_array().unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0]["type"], "table.add_column");
    assert_eq!(changes[0]["impact"]["rows"], 4);
    assert_eq!(changes[0]["impact"]["cells"], 4);
    assert_eq!(sha256_file(&file), before_hash, "dry run must not touch disk");

    let (code, env) = run(&[
        "table",
        "add-column",
        file.to_str().unwrap(),
        "--table",
        "Sales",
        "--name",
        "Margin",
        "--formula",
        "=[@Sales]-[@Cost]",
        "--backup",
    ]);
    assert_eq!(code, 0, "apply failed: {env}");
    assert_eq!(env["ok"], true);
    let backup_path = env["result"]["backup_path"].as_str().expect("backup_path present");
    assert!(std::path::Path::new(backup_path).exists(), "backup file should exist on disk");

    let (code, env) = run(&["table", "ls", file.to_str().unwrap()]);
    assert_eq!(code, 0);
    let tables = env["result"].as_array().unwrap();
    let sales = tables.iter().find(|t| t["name"] == "Sales").expect("Sales table present");
    let columns: Vec<&str> = sales["columns"].as_array().unwrap().iter().map(|c| c["name"].as_str().unwrap()).collect();
    assert!(columns.contains(&"Margin"), "columns were {columns:?}");
}

#[test]
fn fingerprint_conflict_blocks_apply() {
    let dir = tempfile::tempdir().unwrap();
    let file = sales_fixture(&dir);
    create_sales_table(&file);

    let (_, env) = run(&["wb", "inspect", file.to_str().unwrap()]);
    let fingerprint = env["result"]["fingerprint"].as_str().expect("workbook_meta carries a fingerprint").to_string();

    // External modification: append a byte, changing the on-disk fingerprint.
    use std::io::Write;
    let mut f = OpenOptions::new().append(true).open(&file).unwrap();
    f.write_all(b"\0").unwrap();
    drop(f);

    let plan = serde_json::json!({
        "schema_version": 1,
        "plan_id": "conflict-check",
        "target": { "file": file.to_str().unwrap(), "fingerprint": fingerprint },
        "options": { "fail_on_external_change": true },
        "operations": [
            { "op_id": "op1", "type": "cell.set", "ref": "Sheet1!A1", "value": "changed" }
        ],
    });
    let plan_path = dir.path().join("plan.json");
    std::fs::write(&plan_path, serde_json::to_vec_pretty(&plan).unwrap()).unwrap();

    let before_hash = sha256_file(&file);
    let (code, env) = run(&["plan", "apply", plan_path.to_str().unwrap()]);
    assert_eq!(env["ok"], false);
    assert_eq!(env["errors"][0]["code"], "ERR_PLAN_FINGERPRINT_CONFLICT");
    assert_eq!(code, 40);
    assert_eq!(sha256_file(&file), before_hash, "file must be unchanged after a rejected apply");
}

#[test]
fn formula_set_relative_fill() {
    let dir = tempfile::tempdir().unwrap();
    let file = sales_fixture(&dir);

    let (code, env) = run(&[
        "formula",
        "set",
        file.to_str().unwrap(),
        "Sheet1!E2:E5",
        "=C2*D2",
    ]);
    assert_eq!(code, 0, "formula set failed: {env}");
    assert_eq!(env["ok"], true);

    for (row, expected) in [(2, "C2*D2"), (3, "C3*D3"), (4, "C4*D4"), (5, "C5*D5")] {
        let (code, env) = run(&["cell", "get", file.to_str().unwrap(), &format!("Sheet1!E{row}")]);
        assert_eq!(code, 0);
        let formula = env["result"]["value"]["formula"].as_str().unwrap_or_default();
        assert!(formula.contains(expected), "E{row} formula was {formula:?}, expected to contain {expected}");
    }
}

#[test]
fn strict_append_rejects_extra_columns() {
    let dir = tempfile::tempdir().unwrap();
    let file = sales_fixture(&dir);
    create_sales_table(&file);

    let rows_json = serde_json::to_string(&serde_json::json!([
        { "Region": "X", "Product": "Y", "Sales": 1, "Cost": 2, "Extra": 3 }
    ]))
    .unwrap();

    let before_hash = sha256_file(&file);
    let (code, env) = run(&[
        "table",
        "append-rows",
        file.to_str().unwrap(),
        "--table",
        "Sales",
        "--rows-json",
        &rows_json,
        "--schema-mode",
        "strict",
    ]);
    assert_eq!(env["ok"], false);
    assert_eq!(env["errors"][0]["code"], "ERR_SCHEMA_MISMATCH");
    assert_eq!(code, 10);
    assert_eq!(sha256_file(&file), before_hash, "no rows should have been added");

    // The fifth data row (A6) stays empty — nothing was appended past row 5.
    let (_, env) = run(&["cell", "get", file.to_str().unwrap(), "Sheet1!A6"]);
    assert_eq!(env["result"]["value"], serde_json::Value::Null);
}

#[test]
fn verify_reports_failing_assertion() {
    let dir = tempfile::tempdir().unwrap();
    let file = sales_fixture(&dir);

    let assertions = serde_json::json!([
        { "type": "cell.value_equals", "ref": "Sheet1!A2", "expected": "WRONG" }
    ]);
    let assertions_path = dir.path().join("assertions.json");
    std::fs::write(&assertions_path, serde_json::to_vec_pretty(&assertions).unwrap()).unwrap();

    let (code, env) = run(&["verify", file.to_str().unwrap(), assertions_path.to_str().unwrap()]);
    assert_eq!(env["ok"], false);
    assert_eq!(env["errors"][0]["code"], "ERR_ASSERTION_FAILED");
    assert_eq!(code, 10);
    let details = &env["errors"][0]["details"];
    assert!(details.is_array());
    assert_eq!(details[0]["passed"], false);
}

#[test]
fn run_exec_is_blocked_by_the_sidecar_lock_like_any_other_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let file = sales_fixture(&dir);

    let mut lock_path = file.clone().into_os_string();
    lock_path.push(".xl.lock");
    let lock_file = OpenOptions::new().create(true).write(true).read(true).open(&lock_path).unwrap();
    FileExt::lock_exclusive(&lock_file).unwrap();

    let workflow = serde_json::json!({
        "schema_version": "1.0",
        "name": "blocked-run",
        "steps": [
            { "id": "s1", "run": "cell.set", "args": { "ref": "Sheet1!A1", "value": "blocked" } }
        ],
    });
    let workflow_path = dir.path().join("workflow.yaml");
    std::fs::write(&workflow_path, serde_yaml::to_string(&workflow).unwrap()).unwrap();

    let (code, env) = run(&[
        "run",
        "exec",
        workflow_path.to_str().unwrap(),
        file.to_str().unwrap(),
        "--lock-timeout-secs",
        "0",
    ]);
    assert_eq!(env["ok"], false);
    assert_eq!(env["errors"][0]["code"], "ERR_LOCK_HELD");
    assert_eq!(code, 50);

    FileExt::unlock(&lock_file).unwrap();
}

#[test]
fn run_exec_honors_protected_sheet_policy() {
    let dir = tempfile::tempdir().unwrap();
    let file = sales_fixture(&dir);
    std::fs::write(dir.path().join("xl-policy.yaml"), "protected_sheets:\n  - Sheet1\n").unwrap();
    let before_hash = sha256_file(&file);

    let workflow = serde_json::json!({
        "schema_version": "1.0",
        "name": "protected-run",
        "steps": [
            { "id": "s1", "run": "cell.set", "args": { "ref": "Sheet1!A1", "value": "nope" } }
        ],
    });
    let workflow_path = dir.path().join("workflow.yaml");
    std::fs::write(&workflow_path, serde_yaml::to_string(&workflow).unwrap()).unwrap();

    let (code, env) = run(&["run", "exec", workflow_path.to_str().unwrap(), file.to_str().unwrap()]);
    assert_eq!(env["ok"], false);
    assert_eq!(env["errors"][0]["code"], "ERR_PROTECTED");
    assert_eq!(code, 20);
    assert_eq!(sha256_file(&file), before_hash, "protected sheet must block the write entirely");
}

#[test]
fn concurrent_mutation_is_blocked_by_the_sidecar_lock() {
    let dir = tempfile::tempdir().unwrap();
    let file = sales_fixture(&dir);

    let mut lock_path = file.clone().into_os_string();
    lock_path.push(".xl.lock");
    let lock_file = OpenOptions::new().create(true).write(true).read(true).open(&lock_path).unwrap();
    FileExt::lock_exclusive(&lock_file).unwrap();

    let (code, env) = run(&[
        "cell",
        "set",
        file.to_str().unwrap(),
        "Sheet1!A1",
        "\"blocked\"",
        "--lock-timeout-secs",
        "0",
    ]);
    assert_eq!(env["ok"], false);
    assert_eq!(env["errors"][0]["code"], "ERR_LOCK_HELD");
    assert_eq!(code, 50);

    // Readers never take the lock, so they succeed while it's held.
    let (code, env) = run(&["wb", "inspect", file.to_str().unwrap()]);
    assert_eq!(code, 0, "read command should not be blocked by the lock: {env}");

    FileExt::unlock(&lock_file).unwrap();
}
