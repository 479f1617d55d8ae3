//! Tool calls, their results, and the per-turn manifest pairing them.

use serde::{Deserialize, Serialize};

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Model-assigned call id.
    pub tool_call_id: String,
    /// Registered tool name.
    pub name: String,
    /// Parsed arguments.
    #[serde(default)]
    pub arguments: serde_json::Value,
    /// True when the side effect must happen on the caller's side.
    #[serde(default)]
    pub requires_client_execution: bool,
}

impl ToolCall {
    /// Creates a new tool call.
    #[must_use]
    pub fn new(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            arguments,
            requires_client_execution: false,
        }
    }

    /// Returns the arguments serialized as compact JSON.
    #[must_use]
    pub fn arguments_json(&self) -> String {
        if self.arguments.is_null() {
            "{}".to_string()
        } else {
            self.arguments.to_string()
        }
    }
}

/// The outcome of one tool call, positionally paired with its [`ToolCall`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// Id of the call this result answers.
    pub tool_call_id: String,
    /// Name of the tool that produced it.
    pub name: String,
    /// Result payload, when the tool succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_json: Option<String>,
    /// Failure reason, when the tool failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// True for a placeholder awaiting a client submission.
    #[serde(default)]
    pub requires_client_execution: bool,
    /// Server execution time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_ms: Option<u64>,
}

impl ToolCallResult {
    /// Creates a successful server result.
    #[must_use]
    pub fn success(call: &ToolCall, result_json: impl Into<String>) -> Self {
        Self {
            tool_call_id: call.tool_call_id.clone(),
            name: call.name.clone(),
            result_json: Some(result_json.into()),
            ..Self::default()
        }
    }

    /// Creates an empty placeholder for a client-executed call.
    #[must_use]
    pub fn client_placeholder(call: &ToolCall) -> Self {
        Self {
            tool_call_id: call.tool_call_id.clone(),
            name: call.name.clone(),
            requires_client_execution: true,
            ..Self::default()
        }
    }

    /// Returns true if a payload or an error has been recorded.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        has_text(self.result_json.as_deref()) || has_text(self.error_message.as_deref())
    }

    /// Returns true for a client placeholder nobody has filled yet.
    #[must_use]
    pub fn is_pending_client(&self) -> bool {
        self.requires_client_execution && !self.is_resolved()
    }
}

pub(crate) fn has_text(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

/// Ordered pairing of model tool calls and their results.
///
/// Results are appended in call order, so `tool_call_results[i]` always
/// answers `tool_calls[i]`. Calls beyond the last result are pending.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallManifest {
    /// Calls in the order the model emitted them.
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    /// Results in the same order.
    #[serde(default)]
    pub tool_call_results: Vec<ToolCallResult>,
    /// Text shown to the user while client tools run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_continuation_message: Option<String>,
}

impl ToolCallManifest {
    /// Creates an empty manifest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the manifest with a fresh batch of model calls.
    pub fn begin_batch(&mut self, calls: Vec<ToolCall>) {
        self.tool_calls = calls;
        self.tool_call_results.clear();
        self.tool_continuation_message = None;
    }

    /// Drops every call and result.
    pub fn clear(&mut self) {
        self.tool_calls.clear();
        self.tool_call_results.clear();
        self.tool_continuation_message = None;
    }

    /// Returns true if no calls are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tool_calls.is_empty()
    }

    /// Returns calls that have no result yet.
    #[must_use]
    pub fn pending_calls(&self) -> &[ToolCall] {
        let answered = self.tool_call_results.len().min(self.tool_calls.len());
        &self.tool_calls[answered..]
    }

    /// Returns true if the model requested calls that have not run.
    #[must_use]
    pub fn has_pending_tool_calls(&self) -> bool {
        !self.pending_calls().is_empty()
    }

    /// Returns the calls still awaiting a client submission.
    #[must_use]
    pub fn pending_client_calls(&self) -> Vec<&ToolCall> {
        self.tool_calls
            .iter()
            .zip(&self.tool_call_results)
            .filter(|(_, result)| result.is_pending_client())
            .map(|(call, _)| call)
            .collect()
    }

    /// Returns true if any placeholder is waiting on the client.
    #[must_use]
    pub fn has_client_tool_calls(&self) -> bool {
        self.tool_call_results.iter().any(ToolCallResult::is_pending_client)
    }

    /// Appends the result for the next pending call.
    pub fn record_result(&mut self, result: ToolCallResult) {
        self.tool_call_results.push(result);
    }

    /// Counts results recorded so far.
    #[must_use]
    pub fn result_count(&self) -> usize {
        self.tool_call_results.len()
    }
}
