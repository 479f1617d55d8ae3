//! Inbound request and the immutable envelope derived from it.

use serde::{Deserialize, Serialize};

/// A reference to an external entity by id and display text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Entity id.
    pub id: String,
    /// Display text.
    #[serde(default)]
    pub text: String,
}

impl EntityRef {
    /// Creates a new reference.
    #[must_use]
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }

    /// Returns true if the id is blank.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.id.trim().is_empty()
    }
}

/// A client-side tool result posted back to continue a turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResultSubmission {
    /// The call being answered.
    pub tool_call_id: String,
    /// Tool name, if the client sent it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Result payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_json: Option<String>,
    /// Client-side failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ToolResultSubmission {
    /// Creates a successful submission.
    #[must_use]
    pub fn success(tool_call_id: impl Into<String>, result_json: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            result_json: Some(result_json.into()),
            ..Self::default()
        }
    }

    /// Creates a submission reporting a client-side failure.
    #[must_use]
    pub fn failure(tool_call_id: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            error_message: Some(error_message.into()),
            ..Self::default()
        }
    }
}

/// An image pasted by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardImage {
    /// MIME type, e.g. `image/png`.
    pub mime_type: String,
    /// Base64 payload.
    pub data_base64: String,
}

/// A file or snippet attached to the request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputArtifact {
    /// Logical path or name.
    pub path: String,
    /// Artifact content.
    #[serde(default)]
    pub content: String,
}

/// Retrieval scope hints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RagScope {
    /// Repositories to search.
    #[serde(default)]
    pub repos: Vec<String>,
    /// Tags to filter on.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// The wire-level "execute agent" request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentExecuteRequest {
    /// Agent context to run under; the org default is used when absent.
    pub agent_context_id: Option<String>,
    /// Role within the agent context.
    pub conversation_context_id: Option<String>,
    /// Existing session, empty for a new conversation.
    pub session_id: Option<String>,
    /// The turn being followed on or continued.
    pub turn_id: Option<String>,
    /// User instruction text.
    pub instruction: Option<String>,
    /// Whether the caller wants streamed output.
    pub stream: bool,
    /// Client tool results for a continuation.
    pub tool_results: Vec<ToolResultSubmission>,
    /// Pasted images.
    pub clipboard_images: Vec<ClipboardImage>,
    /// Attached files.
    pub input_artifacts: Vec<InputArtifact>,
    /// Retrieval scope.
    pub rag_scope: RagScope,
}

fn normalize(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Immutable per-request descriptor.
///
/// Blank ids from the wire are normalized to `None` so every consumer
/// can test presence with `is_some()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope {
    agent_context_id: Option<String>,
    conversation_context_id: Option<String>,
    session_id: Option<String>,
    turn_id: Option<String>,
    instructions: Option<String>,
    stream: bool,
    tool_results: Vec<ToolResultSubmission>,
    clipboard_images: Vec<ClipboardImage>,
    input_artifacts: Vec<InputArtifact>,
    rag_scope: RagScope,
    org: EntityRef,
    user: EntityRef,
}

impl Envelope {
    /// Builds an envelope from a request and the caller's identity.
    #[must_use]
    pub fn new(request: AgentExecuteRequest, org: EntityRef, user: EntityRef) -> Self {
        Self {
            agent_context_id: normalize(request.agent_context_id),
            conversation_context_id: normalize(request.conversation_context_id),
            session_id: normalize(request.session_id),
            turn_id: normalize(request.turn_id),
            instructions: request.instruction.filter(|i| !i.trim().is_empty()),
            stream: request.stream,
            tool_results: request.tool_results,
            clipboard_images: request.clipboard_images,
            input_artifacts: request.input_artifacts,
            rag_scope: request.rag_scope,
            org,
            user,
        }
    }

    /// Requested agent context id.
    #[must_use]
    pub fn agent_context_id(&self) -> Option<&str> {
        self.agent_context_id.as_deref()
    }

    /// Requested role id.
    #[must_use]
    pub fn conversation_context_id(&self) -> Option<&str> {
        self.conversation_context_id.as_deref()
    }

    /// Session id supplied by the caller.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Turn id supplied by the caller.
    #[must_use]
    pub fn turn_id(&self) -> Option<&str> {
        self.turn_id.as_deref()
    }

    /// The instruction text as sent.
    #[must_use]
    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    /// Whether streaming was requested.
    #[must_use]
    pub fn stream(&self) -> bool {
        self.stream
    }

    /// Submitted client tool results.
    #[must_use]
    pub fn tool_results(&self) -> &[ToolResultSubmission] {
        &self.tool_results
    }

    /// Pasted images.
    #[must_use]
    pub fn clipboard_images(&self) -> &[ClipboardImage] {
        &self.clipboard_images
    }

    /// Attached artifacts.
    #[must_use]
    pub fn input_artifacts(&self) -> &[InputArtifact] {
        &self.input_artifacts
    }

    /// Retrieval scope.
    #[must_use]
    pub fn rag_scope(&self) -> &RagScope {
        &self.rag_scope
    }

    /// Calling organization.
    #[must_use]
    pub fn org(&self) -> &EntityRef {
        &self.org
    }

    /// Calling user.
    #[must_use]
    pub fn user(&self) -> &EntityRef {
        &self.user
    }

    /// Returns true if any of instructions, artifacts or images is present.
    #[must_use]
    pub fn has_content(&self) -> bool {
        self.instructions.is_some()
            || !self.input_artifacts.is_empty()
            || !self.clipboard_images.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_ids_normalize_to_none() {
        let request = AgentExecuteRequest {
            session_id: Some("   ".into()),
            turn_id: Some(String::new()),
            agent_context_id: Some(" ctx ".into()),
            instruction: Some("\n".into()),
            ..AgentExecuteRequest::default()
        };
        let envelope = Envelope::new(request, EntityRef::new("o", "Org"), EntityRef::new("u", "User"));

        assert_eq!(envelope.session_id(), None);
        assert_eq!(envelope.turn_id(), None);
        assert_eq!(envelope.agent_context_id(), Some("ctx"));
        assert!(!envelope.has_content());
    }

    #[test]
    fn test_request_deserializes_with_missing_fields() {
        let request: AgentExecuteRequest =
            serde_json::from_str(r#"{"instruction": "hello", "tool_results": []}"#).unwrap();
        assert_eq!(request.instruction.as_deref(), Some("hello"));
        assert!(request.session_id.is_none());
        assert!(!request.stream);
    }
}
