use super::ValidationReport;
use crate::tools::ToolCallManifest;

pub(crate) const COUNT_MISMATCH: &str = "TOOL_CALL_MANIFEST_COUNT_MISMATCH";
pub(crate) const TOOL_CALL_ID_REQUIRED: &str = "TOOL_CALL_MANIFEST_TOOL_CALL_ID_REQUIRED";
pub(crate) const NAME_REQUIRED: &str = "TOOL_CALL_MANIFEST_NAME_REQUIRED";
pub(crate) const TOOL_CALL_ID_MISMATCH: &str = "TOOL_CALL_MANIFEST_TOOL_CALL_ID_MISMATCH";
pub(crate) const NAME_MISMATCH: &str = "TOOL_CALL_MANIFEST_NAME_MISMATCH";
pub(crate) const RESULT_REQUIRED: &str = "TOOL_CALL_MANIFEST_RESULT_REQUIRED";

/// Checks positional pairing of calls and results.
///
/// A count mismatch is reported alone since rows cannot be paired; every
/// other rule is checked at every index.
pub(crate) fn validate(manifest: &ToolCallManifest) -> ValidationReport {
    let mut report = ValidationReport::new();
    let calls = &manifest.tool_calls;
    let results = &manifest.tool_call_results;

    if calls.len() != results.len() {
        report.push(
            COUNT_MISMATCH,
            format!(
                "ToolCallManifest mismatch: ToolCalls={}, ToolCallResults={}.",
                calls.len(),
                results.len()
            ),
        );
        return report;
    }

    for (i, (call, result)) in calls.iter().zip(results).enumerate() {
        if call.tool_call_id.trim().is_empty() {
            report.push(
                TOOL_CALL_ID_REQUIRED,
                format!("ToolCallManifest invalid at index {i}: ToolCallId is required."),
            );
            continue;
        }

        if call.name.trim().is_empty() {
            report.push(
                NAME_REQUIRED,
                format!(
                    "ToolCallManifest invalid at index {i}: ToolCall Name is required (ToolCallId '{}').",
                    call.tool_call_id
                ),
            );
        }

        if call.tool_call_id != result.tool_call_id {
            report.push(
                TOOL_CALL_ID_MISMATCH,
                format!(
                    "ToolCallManifest invalid at index {i}: ToolCallId mismatch (call '{}' vs result '{}').",
                    call.tool_call_id, result.tool_call_id
                ),
            );
        }

        if call.name != result.name {
            report.push(
                NAME_MISMATCH,
                format!(
                    "ToolCallManifest invalid at index {i}: tool name mismatch for ToolCallId '{}' (call '{}' vs result '{}').",
                    call.tool_call_id, call.name, result.name
                ),
            );
        }

        if !result.is_resolved() {
            report.push(
                RESULT_REQUIRED,
                format!(
                    "Tool call '{}' ({}) failed validation: ResultJson or ErrorMessage is required.",
                    call.name, call.tool_call_id
                ),
            );
        }
    }

    report
}
