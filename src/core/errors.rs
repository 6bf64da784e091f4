//! Closed error taxonomy. Every fallible core operation returns a `CoreError`
//! variant from this set; nothing downstream of the operation engine invents
//! new error codes.

use thiserror::Error;

/// One variant per error family. `code()` returns the wire-level error code
/// string that the envelope and the exit-code classifier both key off of.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("range invalid: {0}")]
    RangeInvalid(String),

    #[error("workbook not found: {0}")]
    WorkbookNotFound(String),

    #[error("workbook corrupt: {0}")]
    WorkbookCorrupt(String),

    #[error("file already exists: {0}")]
    FileExists(String),

    #[error("sheet not found: {0}")]
    SheetNotFound(String),

    #[error("sheet already exists: {0}")]
    SheetExists(String),

    #[error("cannot delete the last sheet in a workbook")]
    LastSheet,

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("table already exists: {0}")]
    TableExists(String),

    #[error("table rectangle overlaps an existing table: {0}")]
    TableOverlap(String),

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("column already exists: {0}")]
    ColumnExists(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("refusing to overwrite a formula cell without force_overwrite_formulas")]
    FormulaOverwriteBlocked,

    #[error("formula.set blocked on every targeted cell: {0}")]
    FormulaBlocked(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("missing required parameter: {0}")]
    MissingParam(String),

    #[error("plan body could not be parsed: {0}")]
    PlanInvalid(String),

    #[error("plan validation failed")]
    ValidationFailed(Vec<crate::core::validator::FailedCheck>),

    #[error("operation {op_id} failed: {cause}")]
    OperationFailed { op_id: String, cause: String },

    #[error("plan target fingerprint conflict: expected {expected}, found {actual}")]
    PlanFingerprintConflict { expected: String, actual: String },

    #[error("operation targets a policy-protected range or sheet: {0}")]
    Protected(String),

    #[error("workflow definition invalid")]
    WorkflowInvalid(Vec<String>),

    #[error("lock held by another process: {0}")]
    LockHeld(String),

    #[error("assertion failed")]
    AssertionFailed(Vec<crate::core::verify::FailedAssertion>),

    #[error("operation not supported: {0}")]
    Unsupported(String),

    #[error("usage error: {0}")]
    Usage(String),

    #[error("query backend error: {0}")]
    Query(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// The stable wire error code. Exit-code classification in
    /// `crate::core::envelope` matches on substrings of this string, so the
    /// exact spelling here is load-bearing.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::RangeInvalid(_) => "ERR_RANGE_INVALID",
            CoreError::WorkbookNotFound(_) => "ERR_WORKBOOK_NOT_FOUND",
            CoreError::WorkbookCorrupt(_) => "ERR_WORKBOOK_CORRUPT",
            CoreError::FileExists(_) => "ERR_FILE_EXISTS",
            CoreError::SheetNotFound(_) => "ERR_SHEET_NOT_FOUND",
            CoreError::SheetExists(_) => "ERR_SHEET_EXISTS",
            CoreError::LastSheet => "ERR_LAST_SHEET",
            CoreError::TableNotFound(_) => "ERR_TABLE_NOT_FOUND",
            CoreError::TableExists(_) => "ERR_TABLE_EXISTS",
            CoreError::TableOverlap(_) => "ERR_TABLE_OVERLAP",
            CoreError::ColumnNotFound(_) => "ERR_COLUMN_NOT_FOUND",
            CoreError::ColumnExists(_) => "ERR_COLUMN_EXISTS",
            CoreError::SchemaMismatch(_) => "ERR_SCHEMA_MISMATCH",
            CoreError::FormulaOverwriteBlocked => "ERR_FORMULA_OVERWRITE_BLOCKED",
            CoreError::FormulaBlocked(_) => "ERR_FORMULA_BLOCKED",
            CoreError::InvalidArgument(_) => "ERR_INVALID_ARGUMENT",
            CoreError::MissingParam(_) => "ERR_MISSING_PARAM",
            CoreError::PlanInvalid(_) => "ERR_PLAN_INVALID",
            CoreError::ValidationFailed(_) => "ERR_VALIDATION_FAILED",
            CoreError::OperationFailed { .. } => "ERR_OPERATION_FAILED",
            CoreError::PlanFingerprintConflict { .. } => "ERR_PLAN_FINGERPRINT_CONFLICT",
            CoreError::Protected(_) => "ERR_PROTECTED",
            CoreError::WorkflowInvalid(_) => "ERR_WORKFLOW_INVALID",
            CoreError::LockHeld(_) => "ERR_LOCK_HELD",
            CoreError::AssertionFailed(_) => "ERR_ASSERTION_FAILED",
            CoreError::Unsupported(_) => "ERR_UNSUPPORTED",
            CoreError::Usage(_) => "ERR_USAGE",
            CoreError::Query(_) => "ERR_QUERY",
            CoreError::Internal(_) => "ERR_INTERNAL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_stable_for_range_invalid() {
        assert_eq!(CoreError::RangeInvalid("A0".into()).code(), "ERR_RANGE_INVALID");
    }
}
