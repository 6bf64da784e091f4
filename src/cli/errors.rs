//! Converts a `CoreError` into the `details` payload an error envelope
//! carries, surfacing the structured check/issue lists the validator,
//! verifier, and workflow loader attach to their errors.

use crate::core::envelope::{ResponseEnvelope, Target};
use crate::core::errors::CoreError;
use serde_json::Value;

pub fn error_details(err: &CoreError) -> Option<Value> {
    match err {
        CoreError::ValidationFailed(checks) => Some(serde_json::to_value(checks).unwrap_or(Value::Null)),
        CoreError::AssertionFailed(failures) => Some(serde_json::to_value(failures).unwrap_or(Value::Null)),
        CoreError::WorkflowInvalid(issues) => Some(serde_json::json!({ "issues": issues })),
        CoreError::OperationFailed { op_id, cause } => Some(serde_json::json!({ "op_id": op_id, "cause": cause })),
        CoreError::PlanFingerprintConflict { expected, actual } => {
            Some(serde_json::json!({ "expected": expected, "actual": actual }))
        }
        _ => None,
    }
}

pub fn envelope_for_error(
    command: &str,
    target: Option<Target>,
    err: &CoreError,
    duration_ms: u64,
) -> ResponseEnvelope {
    ResponseEnvelope::error(command, target, err.code(), err.to_string(), error_details(err), duration_ms)
}
