//! What the model produced for the caller.

use serde::{Deserialize, Serialize};

/// Token counters reported by the model provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Usage {
    /// Prompt tokens.
    pub prompt_tokens: u64,
    /// Completion tokens.
    pub completion_tokens: u64,
    /// Total tokens.
    pub total_tokens: u64,
    /// Reasoning tokens.
    pub reasoning_tokens: u64,
    /// Cached prompt tokens.
    pub cached_tokens: u64,
}

/// A file produced by the model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseFile {
    /// Path or name.
    pub path: String,
    /// File content.
    pub content: String,
}

/// A candidate command offered when ACP input was ambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcpIntent {
    /// Command id.
    pub command_id: String,
    /// Display name.
    pub display_name: String,
    /// Description.
    pub description: String,
    /// Parsed arguments.
    pub args: Vec<String>,
}

/// The final (or ACP) payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponsePayload {
    /// The main answer text.
    pub primary_output_text: Option<String>,
    /// Produced files.
    pub files: Vec<ResponseFile>,
    /// Token usage for the producing call.
    pub usage: Usage,
    /// Provider response id.
    pub response_id: Option<String>,
    /// Candidate commands for an ambiguous ACP input.
    pub acp_intents: Vec<AcpIntent>,
}

impl ResponsePayload {
    /// Creates a payload with just text.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            primary_output_text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Sets usage.
    #[must_use]
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    /// Returns true if the primary text is present and not blank.
    #[must_use]
    pub fn has_primary_output(&self) -> bool {
        crate::tools::has_text(self.primary_output_text.as_deref())
    }
}

/// What kind of response the context currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    /// Neither a payload nor pending client calls.
    NotReady,
    /// A final answer.
    Final,
    /// Client tools must run before the turn can continue.
    ToolContinuation,
    /// An ACP command response.
    Acp,
}
