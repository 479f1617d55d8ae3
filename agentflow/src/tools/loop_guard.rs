//! Detects the model calling the same tool with the same arguments repeatedly.

use super::ToolCall;
use crate::config::LoopGuardConfig;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// What to do with a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopGuardDecision {
    /// Run the call.
    Execute,
    /// Run the call, and warn the model it is repeating itself.
    Warn {
        /// Times this signature has been seen, including this call.
        repeat_count: u32,
        /// Instruction to add to the prompt.
        message: String,
    },
    /// Do not run the call; record `result_json` instead.
    Suppress {
        /// Times this signature has been seen, including this call.
        repeat_count: u32,
        /// Synthetic result payload.
        result_json: String,
    },
}

/// Per-turn repeat-call tracker.
#[derive(Debug, Clone)]
pub struct ToolLoopGuard {
    config: LoopGuardConfig,
    seen: HashMap<String, u32>,
}

impl ToolLoopGuard {
    /// Creates a guard with no history.
    #[must_use]
    pub fn new(config: LoopGuardConfig) -> Self {
        Self {
            config,
            seen: HashMap::new(),
        }
    }

    /// Returns `name:sha256(canonical arguments)`.
    #[must_use]
    pub fn signature(call: &ToolCall) -> String {
        let canonical = canonicalize(&call.arguments).to_string();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        format!("{}:{}", call.name, hex::encode(hasher.finalize()))
    }

    /// Records `call` and decides what to do with it.
    ///
    /// Repeats are counted from the first call, but the guard only acts
    /// once at least one tool result exists in the turn.
    pub fn check(&mut self, call: &ToolCall, has_prior_results: bool) -> LoopGuardDecision {
        let count = self.seen.entry(Self::signature(call)).or_insert(0);
        *count += 1;
        let repeat_count = *count;

        if !has_prior_results {
            return LoopGuardDecision::Execute;
        }

        if repeat_count >= self.config.suppress_threshold {
            let result = serde_json::json!({
                "suppressed": true,
                "reason": "repeat_tool_call_detected",
                "tool": call.name,
                "guidance": format!(
                    "You already called '{}' with identical arguments {} times. Use the results you have and give your final answer within {} iteration(s).",
                    call.name, repeat_count, self.config.force_finalize_remaining
                ),
            });
            return LoopGuardDecision::Suppress {
                repeat_count,
                result_json: result.to_string(),
            };
        }

        if repeat_count >= self.config.warn_threshold {
            return LoopGuardDecision::Warn {
                repeat_count,
                message: format!(
                    "Tool '{}' has been called {} times with identical arguments. Reuse earlier results instead of repeating the call.",
                    call.name, repeat_count
                ),
            };
        }

        LoopGuardDecision::Execute
    }
}

fn canonicalize(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = serde_json::Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(canonicalize).collect())
        }
        other => other.clone(),
    }
}
