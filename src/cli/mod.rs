//! Thin clap-based CLI adapter: one subcommand tree over the noun surface
//! (`wb`, `sheet`, `table`, `cell`, `range`, `formula`, `format`, `plan`,
//! `verify`, `diff`, `run`, `query`, `serve`), each arm doing nothing but
//! parse args, call into `commands::*`, and hand the result to the single
//! response envelope every invocation emits.

pub mod commands;
pub mod errors;
pub mod output;

use crate::core::envelope::{ResponseEnvelope, Target};
use crate::core::errors::CoreError;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Debug, Parser)]
#[command(name = "xlpatch", version, about = "Transactional OOXML spreadsheet patch-plan engine")]
pub struct Cli {
    /// Also print a short human-readable summary to stderr. Stdout always
    /// carries exactly one JSON envelope regardless of this flag; the
    /// `LLM=0` environment variable has the same effect.
    #[arg(long, global = true)]
    pub human: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    Wb {
        #[command(subcommand)]
        action: WbCommand,
    },
    Sheet {
        #[command(subcommand)]
        action: SheetCommand,
    },
    Table {
        #[command(subcommand)]
        action: TableCommand,
    },
    Cell {
        #[command(subcommand)]
        action: CellCommand,
    },
    Range {
        #[command(subcommand)]
        action: RangeCommand,
    },
    Formula {
        #[command(subcommand)]
        action: FormulaCommand,
    },
    Format {
        #[command(subcommand)]
        action: FormatCommand,
    },
    Plan {
        #[command(subcommand)]
        action: PlanCommand,
    },
    /// Run a closed set of post-apply assertions against a workbook.
    Verify {
        file: PathBuf,
        assertions_file: PathBuf,
    },
    /// Structural value diff between two workbook files.
    Diff {
        file_a: PathBuf,
        file_b: PathBuf,
        #[arg(long)]
        sheet: Option<String>,
        #[arg(long)]
        formulas: bool,
    },
    Run {
        #[command(subcommand)]
        action: RunCommand,
    },
    /// Materialize every table as a columnar snapshot and run `sql`
    /// against it. No SQL engine ships in this binary, so this always
    /// reports `ERR_UNSUPPORTED` until a build wires one in.
    Query {
        file: PathBuf,
        sql: String,
    },
    /// Run the blocking line-delimited JSON stdio server.
    Serve,
}

#[derive(Debug, Subcommand)]
pub enum WbCommand {
    Inspect { file: PathBuf },
    Create {
        file: PathBuf,
        #[arg(long = "sheet")]
        sheets: Vec<String>,
        #[arg(long)]
        force: bool,
    },
    LockStatus { file: PathBuf },
}

#[derive(Debug, Subcommand)]
pub enum SheetCommand {
    Ls { file: PathBuf },
    Create {
        file: PathBuf,
        name: String,
        #[arg(long)]
        position: Option<usize>,
        #[command(flatten)]
        apply: ApplyArgs,
    },
    Rename {
        file: PathBuf,
        old_name: String,
        new_name: String,
        #[command(flatten)]
        apply: ApplyArgs,
    },
    Delete {
        file: PathBuf,
        name: String,
        #[command(flatten)]
        apply: ApplyArgs,
    },
}

#[derive(Debug, Subcommand)]
pub enum TableCommand {
    Ls { file: PathBuf },
    Create {
        file: PathBuf,
        #[arg(long)]
        sheet: String,
        #[arg(long)]
        name: String,
        #[arg(long = "ref")]
        reference: String,
        #[arg(long)]
        headers: Vec<String>,
        #[command(flatten)]
        apply: ApplyArgs,
    },
    AddColumn {
        file: PathBuf,
        #[arg(long)]
        table: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        formula: Option<String>,
        #[arg(long = "default-value")]
        default_value: Option<String>,
        #[command(flatten)]
        apply: ApplyArgs,
    },
    DeleteColumn {
        file: PathBuf,
        #[arg(long)]
        table: String,
        #[arg(long)]
        name: String,
        #[command(flatten)]
        apply: ApplyArgs,
    },
    Delete {
        file: PathBuf,
        #[arg(long)]
        table: String,
        #[command(flatten)]
        apply: ApplyArgs,
    },
    AppendRows {
        file: PathBuf,
        #[arg(long)]
        table: String,
        #[arg(long = "rows-json")]
        rows_json: String,
        #[arg(long = "schema-mode")]
        schema_mode: Option<String>,
        #[command(flatten)]
        apply: ApplyArgs,
    },
}

#[derive(Debug, Subcommand)]
pub enum CellCommand {
    Get {
        file: PathBuf,
        #[arg(name = "ref")]
        reference: String,
    },
    Set {
        file: PathBuf,
        #[arg(name = "ref")]
        reference: String,
        /// A JSON-encoded value: `42`, `"text"`, `true`, `null`.
        value_json: String,
        #[arg(long = "cell-type")]
        cell_type: Option<String>,
        #[arg(long)]
        force_overwrite_formulas: bool,
        #[command(flatten)]
        apply: ApplyArgs,
    },
}

#[derive(Debug, Subcommand)]
pub enum RangeCommand {
    Clear {
        file: PathBuf,
        #[arg(name = "ref")]
        reference: String,
        #[arg(long)]
        keep_contents: bool,
        #[arg(long)]
        formats: bool,
        #[command(flatten)]
        apply: ApplyArgs,
    },
}

#[derive(Debug, Subcommand)]
pub enum FormulaCommand {
    Set {
        file: PathBuf,
        #[arg(name = "ref")]
        reference: String,
        formula: String,
        #[arg(long = "fill-mode")]
        fill_mode: Option<String>,
        #[arg(long)]
        force_overwrite_values: bool,
        #[arg(long)]
        force_overwrite_formulas: bool,
        #[command(flatten)]
        apply: ApplyArgs,
    },
    Find {
        file: PathBuf,
        pattern: String,
        #[arg(long)]
        sheet: Option<String>,
    },
    Lint {
        file: PathBuf,
        #[arg(long)]
        sheet: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum FormatCommand {
    Number {
        file: PathBuf,
        #[arg(name = "ref")]
        reference: String,
        #[arg(long)]
        style: String,
        #[arg(long)]
        decimals: Option<u32>,
        #[command(flatten)]
        apply: ApplyArgs,
    },
    Width {
        file: PathBuf,
        #[arg(long)]
        sheet: String,
        #[arg(long)]
        columns: Vec<String>,
        #[arg(long)]
        width: f64,
        #[command(flatten)]
        apply: ApplyArgs,
    },
    Freeze {
        file: PathBuf,
        #[arg(long)]
        sheet: String,
        #[arg(long = "at")]
        at: Option<String>,
        #[arg(long)]
        unfreeze: bool,
        #[command(flatten)]
        apply: ApplyArgs,
    },
}

#[derive(Debug, Subcommand)]
pub enum PlanCommand {
    Validate { plan_file: PathBuf },
    Apply {
        plan_file: PathBuf,
        #[command(flatten)]
        apply: ApplyArgs,
    },
}

#[derive(Debug, Subcommand)]
pub enum RunCommand {
    Validate { workflow_file: PathBuf },
    Exec {
        workflow_file: PathBuf,
        workbook_file: PathBuf,
        #[arg(long = "lock-timeout-secs")]
        lock_timeout_secs: Option<u64>,
    },
}

/// Shared apply-time knobs every mutating command takes.
#[derive(Debug, Clone, clap::Args)]
pub struct ApplyArgs {
    #[arg(long)]
    pub dry_run: bool,
    #[arg(long)]
    pub backup: bool,
    #[arg(long = "lock-timeout-secs")]
    pub lock_timeout_secs: Option<u64>,
}

fn parse_value_json(text: &str) -> Result<Value, CoreError> {
    serde_json::from_str(text).map_err(|e| CoreError::InvalidArgument(format!("not valid JSON: {e}")))
}

fn target(file: &std::path::Path) -> Target {
    Target { file: Some(file.display().to_string()), ..Target::default() }
}

fn target_sheet(file: &std::path::Path, sheet: &str) -> Target {
    Target { file: Some(file.display().to_string()), sheet: Some(sheet.to_string()), ..Target::default() }
}

fn target_ref(file: &std::path::Path, reference: &str) -> Target {
    Target { file: Some(file.display().to_string()), reference: Some(reference.to_string()), ..Target::default() }
}

fn target_table(file: &std::path::Path, table: &str) -> Target {
    Target { file: Some(file.display().to_string()), table: Some(table.to_string()), ..Target::default() }
}

/// Dispatches one parsed `Commands` value, returning the wire command name,
/// the target this invocation addressed, and the (still-unwrapped) result.
fn dispatch(command: Commands) -> (String, Option<Target>, Result<Value, CoreError>) {
    use commands::*;

    match command {
        Commands::Wb { action } => match action {
            WbCommand::Inspect { file } => ("wb.inspect".into(), Some(target(&file)), wb::inspect(&file)),
            WbCommand::Create { file, sheets, force } => {
                ("wb.create".into(), Some(target(&file)), wb::create(&file, sheets, force))
            }
            WbCommand::LockStatus { file } => {
                ("wb.lock_status".into(), Some(target(&file)), wb::lock_status(&file))
            }
        },
        Commands::Sheet { action } => match action {
            SheetCommand::Ls { file } => ("sheet.ls".into(), Some(target(&file)), sheet::ls(&file)),
            SheetCommand::Create { file, name, position, apply } => (
                "sheet.create".into(),
                Some(target_sheet(&file, &name)),
                sheet::create(&file, name.clone(), position, apply.dry_run, apply.backup, apply.lock_timeout_secs),
            ),
            SheetCommand::Rename { file, old_name, new_name, apply } => (
                "sheet.rename".into(),
                Some(target_sheet(&file, &old_name)),
                sheet::rename(&file, old_name, new_name, apply.dry_run, apply.backup, apply.lock_timeout_secs),
            ),
            SheetCommand::Delete { file, name, apply } => (
                "sheet.delete".into(),
                Some(target_sheet(&file, &name)),
                sheet::delete(&file, name, apply.dry_run, apply.backup, apply.lock_timeout_secs),
            ),
        },
        Commands::Table { action } => match action {
            TableCommand::Ls { file } => ("table.ls".into(), Some(target(&file)), table::ls(&file)),
            TableCommand::Create { file, sheet, name, reference, headers, apply } => (
                "table.create".into(),
                Some(target_table(&file, &name)),
                table::create(
                    &file,
                    sheet,
                    name,
                    reference,
                    headers,
                    apply.dry_run,
                    apply.backup,
                    apply.lock_timeout_secs,
                ),
            ),
            TableCommand::AddColumn { file, table, name, formula, default_value, apply } => {
                let default_value = match default_value {
                    Some(raw) => match parse_value_json(&raw) {
                        Ok(v) => Some(v),
                        Err(e) => return ("table.add_column".into(), Some(target_table(&file, &table)), Err(e)),
                    },
                    None => None,
                };
                (
                    "table.add_column".into(),
                    Some(target_table(&file, &table)),
                    table::add_column(
                        &file,
                        table,
                        name,
                        formula,
                        default_value,
                        apply.dry_run,
                        apply.backup,
                        apply.lock_timeout_secs,
                    ),
                )
            }
            TableCommand::DeleteColumn { file, table, name, apply } => (
                "table.delete_column".into(),
                Some(target_table(&file, &table)),
                table::delete_column(&file, table, name, apply.dry_run, apply.backup, apply.lock_timeout_secs),
            ),
            TableCommand::Delete { file, table, apply } => (
                "table.delete".into(),
                Some(target_table(&file, &table)),
                table::delete(&file, table, apply.dry_run, apply.backup, apply.lock_timeout_secs),
            ),
            TableCommand::AppendRows { file, table, rows_json, schema_mode, apply } => (
                "table.append_rows".into(),
                Some(target_table(&file, &table)),
                table::append_rows(
                    &file,
                    table,
                    rows_json,
                    schema_mode,
                    apply.dry_run,
                    apply.backup,
                    apply.lock_timeout_secs,
                ),
            ),
        },
        Commands::Cell { action } => match action {
            CellCommand::Get { file, reference } => {
                ("cell.get".into(), Some(target_ref(&file, &reference)), cell::get(&file, &reference))
            }
            CellCommand::Set { file, reference, value_json, cell_type, force_overwrite_formulas, apply } => {
                let value = match parse_value_json(&value_json) {
                    Ok(v) => v,
                    Err(e) => return ("cell.set".into(), Some(target_ref(&file, &reference)), Err(e)),
                };
                (
                    "cell.set".into(),
                    Some(target_ref(&file, &reference)),
                    cell::set(
                        &file,
                        reference,
                        value,
                        cell_type,
                        force_overwrite_formulas,
                        apply.dry_run,
                        apply.backup,
                        apply.lock_timeout_secs,
                    ),
                )
            }
        },
        Commands::Range { action } => match action {
            RangeCommand::Clear { file, reference, keep_contents, formats, apply } => (
                "range.clear".into(),
                Some(target_ref(&file, &reference)),
                range::clear(
                    &file,
                    reference,
                    keep_contents,
                    formats,
                    apply.dry_run,
                    apply.backup,
                    apply.lock_timeout_secs,
                ),
            ),
        },
        Commands::Formula { action } => match action {
            FormulaCommand::Set { file, reference, formula, fill_mode, force_overwrite_values, force_overwrite_formulas, apply } => (
                "formula.set".into(),
                Some(target_ref(&file, &reference)),
                formula::set(
                    &file,
                    reference,
                    formula,
                    fill_mode,
                    force_overwrite_values,
                    force_overwrite_formulas,
                    apply.dry_run,
                    apply.backup,
                    apply.lock_timeout_secs,
                ),
            ),
            FormulaCommand::Find { file, pattern, sheet } => {
                ("formula.find".into(), Some(target(&file)), formula::find(&file, &pattern, sheet))
            }
            FormulaCommand::Lint { file, sheet } => {
                ("formula.lint".into(), Some(target(&file)), formula::lint(&file, sheet))
            }
        },
        Commands::Format { action } => match action {
            FormatCommand::Number { file, reference, style, decimals, apply } => (
                "format.number".into(),
                Some(target_ref(&file, &reference)),
                format::number(&file, reference, style, decimals, apply.dry_run, apply.backup, apply.lock_timeout_secs),
            ),
            FormatCommand::Width { file, sheet, columns, width, apply } => (
                "format.width".into(),
                Some(target_sheet(&file, &sheet)),
                format::width(&file, sheet, columns, width, apply.dry_run, apply.backup, apply.lock_timeout_secs),
            ),
            FormatCommand::Freeze { file, sheet, at, unfreeze, apply } => (
                "format.freeze".into(),
                Some(target_sheet(&file, &sheet)),
                format::freeze(&file, sheet, at, unfreeze, apply.dry_run, apply.backup, apply.lock_timeout_secs),
            ),
        },
        Commands::Plan { action } => match action {
            PlanCommand::Validate { plan_file } => ("plan.validate".into(), None, plan::validate(&plan_file)),
            PlanCommand::Apply { plan_file, apply } => (
                "plan.apply".into(),
                None,
                plan::apply(&plan_file, apply.dry_run, apply.backup, apply.lock_timeout_secs),
            ),
        },
        Commands::Verify { file, assertions_file } => {
            ("verify".into(), Some(target(&file)), verify::run(&file, &assertions_file))
        }
        Commands::Diff { file_a, file_b, sheet, formulas } => {
            ("diff".into(), Some(target(&file_a)), diff::run(&file_a, &file_b, sheet, formulas))
        }
        Commands::Run { action } => match action {
            RunCommand::Validate { workflow_file } => ("run.validate".into(), None, run::validate(&workflow_file)),
            RunCommand::Exec { workflow_file, workbook_file, lock_timeout_secs } => (
                "run.exec".into(),
                Some(target(&workbook_file)),
                run::exec(&workflow_file, &workbook_file, lock_timeout_secs),
            ),
        },
        Commands::Query { file, sql } => ("query".into(), Some(target(&file)), query::run(&file, &sql)),
        Commands::Serve => ("serve".into(), None, Err(CoreError::Usage("serve must be run via `xlpatch serve`, not dispatched".into()))),
    }
}

/// Runs one CLI invocation end to end and returns the process exit code.
/// `serve` is handled separately by `main` since it never produces a single
/// envelope.
pub fn run(cli: Cli) -> i32 {
    let human = output::human_mode(cli.human);
    let start = Instant::now();
    let (command_name, target, result) = dispatch(cli.command);
    let duration_ms = start.elapsed().as_millis() as u64;

    let env = match result {
        Ok(value) => ResponseEnvelope::success(command_name, target.unwrap_or_default(), value, duration_ms),
        Err(err) => errors::envelope_for_error(&command_name, target, &err, duration_ms),
    };
    output::emit(&env, human)
}
