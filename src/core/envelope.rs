//! The one response shape every invocation produces, and the deterministic
//! mapping from error code to process exit code.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Target {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warning {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RecalcInfo {
    pub mode: String,
    pub performed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub ok: bool,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorDetail>,
    pub metrics: Metrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recalc: Option<RecalcInfo>,
}

impl ResponseEnvelope {
    pub fn success(command: impl Into<String>, target: Target, result: Value, duration_ms: u64) -> Self {
        ResponseEnvelope {
            ok: true,
            command: command.into(),
            target: Some(target),
            result: Some(result),
            changes: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
            metrics: Metrics { duration_ms },
            recalc: None,
        }
    }

    pub fn error(
        command: impl Into<String>,
        target: Option<Target>,
        code: impl Into<String>,
        message: impl Into<String>,
        details: Option<Value>,
        duration_ms: u64,
    ) -> Self {
        ResponseEnvelope {
            ok: false,
            command: command.into(),
            target,
            result: None,
            changes: Vec::new(),
            warnings: Vec::new(),
            errors: vec![ErrorDetail {
                code: code.into(),
                message: message.into(),
                details,
            }],
            metrics: Metrics { duration_ms },
            recalc: None,
        }
    }

    pub fn with_changes(mut self, changes: Vec<Value>) -> Self {
        self.changes = changes;
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<Warning>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn with_recalc(mut self, recalc: RecalcInfo) -> Self {
        self.recalc = Some(recalc);
        self
    }

    /// The process exit code for this envelope: 0 if `ok`, otherwise the
    /// classification of the first error's code.
    pub fn exit_code(&self) -> i32 {
        if self.ok {
            return 0;
        }
        match self.errors.first() {
            Some(e) => exit_code_for(&e.code),
            None => 90,
        }
    }

    /// Serialize as the single pretty-printed JSON document followed by a
    /// trailing newline that every invocation writes to stdout exactly once.
    pub fn to_stdout_string(&self) -> String {
        let mut s = serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string());
        s.push('\n');
        s
    }
}

/// Validation-class marker substrings (exit 10). Checked before the
/// IO/NOT_FOUND/CORRUPT/LOCK class (exit 50) so that e.g. `ERR_SHEET_NOT_FOUND`
/// — which also matches a generic `NOT_FOUND` substring rule — lands on 10.
const VALIDATION_MARKERS: &[&str] = &[
    "VALIDATION",
    "SCHEMA",
    "RANGE",
    "PLAN_INVALID",
    "MISSING_",
    "ASSERTION",
    "INVALID_ARGUMENT",
    "PATTERN_INVALID",
    "COLUMN_EXISTS",
    "WORKFLOW_INVALID",
    "USAGE",
    "TARGET_MISMATCH",
    "SHEET_NOT_FOUND",
    "SHEET_EXISTS",
    "FILE_EXISTS",
    "LAST_SHEET",
];

/// Deterministic code → exit-class mapping, by substring match, in the
/// priority order fixed by the error taxonomy: protected, formula-safety,
/// conflict, unsupported, validation, I/O, recalc, else internal.
pub fn exit_code_for(code: &str) -> i32 {
    if code.contains("PROTECTED") {
        return 20;
    }
    if code.contains("FORMULA") {
        return 30;
    }
    if code.contains("FINGERPRINT") || code.contains("CONFLICT") {
        return 40;
    }
    if code.contains("UNSUPPORTED") {
        return 70;
    }
    if VALIDATION_MARKERS.iter().any(|m| code.contains(m)) {
        return 10;
    }
    if code.contains("NOT_FOUND") || code.contains("CORRUPT") || code.contains("LOCK") {
        return 50;
    }
    if code.contains("RECALC") {
        return 60;
    }
    90
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protected_outranks_validation_markers() {
        assert_eq!(exit_code_for("ERR_PROTECTED"), 20);
    }

    #[test]
    fn formula_overwrite_blocked_is_30_not_10() {
        assert_eq!(exit_code_for("ERR_FORMULA_OVERWRITE_BLOCKED"), 30);
    }

    #[test]
    fn sheet_not_found_is_validation_class_not_io() {
        // contains both a validation marker (SHEET_NOT_FOUND) and would also
        // match the generic NOT_FOUND io rule; validation wins.
        assert_eq!(exit_code_for("ERR_SHEET_NOT_FOUND"), 10);
    }

    #[test]
    fn workbook_not_found_is_io_class() {
        assert_eq!(exit_code_for("ERR_WORKBOOK_NOT_FOUND"), 50);
    }

    #[test]
    fn fingerprint_conflict_is_40() {
        assert_eq!(exit_code_for("ERR_PLAN_FINGERPRINT_CONFLICT"), 40);
    }

    #[test]
    fn lock_held_is_50() {
        assert_eq!(exit_code_for("ERR_LOCK_HELD"), 50);
    }

    #[test]
    fn unknown_code_falls_to_internal() {
        assert_eq!(exit_code_for("ERR_SOMETHING_NEW"), 90);
    }

    #[test]
    fn ok_envelope_exit_is_zero() {
        let env = ResponseEnvelope::success("wb.inspect", Target::default(), Value::Null, 1);
        assert_eq!(env.exit_code(), 0);
    }
}
