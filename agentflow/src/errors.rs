//! Error types for the agent pipeline.
//!
//! Errors fall into a small taxonomy:
//!
//! - **Contract violations**: a step's pre or post contract did not hold.
//!   These are defects and carry every violation found in one pass.
//! - **Request errors**: the inbound envelope is malformed.
//! - **Tool failures**: a server tool failed and the turn was aborted.
//! - **Loop exhaustion**: the reasoner hit its iteration bound.
//! - **Transport failures**: the LLM client or stream reader failed.
//!
//! Every variant maps to a stable code from [`codes`].

use crate::pipeline::PipelineStepKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Stable error codes surfaced to callers and logs.
pub mod codes {
    /// The request envelope failed core or type-based validation.
    pub const INVALID_REQUEST: &str = "AGENT_REQUEST_INVALID";
    /// A step's pre or post contract did not hold.
    pub const CONTRACT_VIOLATION: &str = "AGENT_PIPELINE_CONTRACT_VIOLATION";
    /// No pending manifest exists for the continued turn.
    pub const MANIFEST_NOT_FOUND: &str = "CLIENT_TOOL_CONTINUATION_RESOLVER_MANIFEST_NOT_FOUND";
    /// Client-submitted tool results could not be merged into the manifest.
    pub const RECONCILIATION_FAILED: &str = "CLIENT_TOOL_CONTINUATION_RESOLVER_RECONCILIATION_FAILED";
    /// A server tool failed during reasoning.
    pub const TOOL_EXECUTION_FAILED: &str = "AGENT_TOOL_EXECUTION_FAILED";
    /// The reasoner exceeded its iteration bound.
    pub const MAX_ITERATIONS_EXCEEDED: &str = "AGENT_REASONER_MAX_ITERATIONS_EXCEEDED";
    /// A referenced entity does not exist.
    pub const NOT_FOUND: &str = "AGENT_ENTITY_NOT_FOUND";
    /// The LLM client failed.
    pub const LLM_FAILED: &str = "AGENT_LLM_CLIENT_FAILED";
    /// The session changed underneath this request.
    pub const SESSION_CONFLICT: &str = "AGENT_SESSION_VERSION_CONFLICT";
    /// The request was cancelled cooperatively.
    pub const ABORTED: &str = "AGENT_PIPELINE_ABORTED";
    /// A backing store failed.
    pub const STORE_FAILED: &str = "AGENT_STORE_FAILED";
    /// An ACP command failed.
    pub const ACP_COMMAND_FAILED: &str = "AGENT_ACP_COMMAND_FAILED";
    /// Unexpected internal failure.
    pub const INTERNAL: &str = "AGENT_INTERNAL_ERROR";

    /// The stream reader was invoked before a session was attached.
    pub const STREAM_MISSING_SESSION: &str = "STREAM_MISSING_SESSION";
    /// The stream was cancelled mid-read.
    pub const STREAM_CANCELLED: &str = "STREAM_CANCELLED";
    /// The stream ended without a completed event.
    pub const STREAM_EMPTY_COMPLETED: &str = "STREAM_EMPTY_COMPLETED";
    /// The underlying transport failed while reading.
    pub const STREAM_READ_FAILED: &str = "STREAM_READ_FAILED";
}

/// One failed rule from a validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Stable rule code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl Violation {
    /// Creates a new violation.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Which side of a step a contract check ran on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractPhase {
    /// Entry contract.
    Pre,
    /// Exit contract.
    Post,
}

impl fmt::Display for ContractPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pre => write!(f, "PRE"),
            Self::Post => write!(f, "POST"),
        }
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// The main error type for pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The request envelope is malformed.
    #[error("Invalid request: {}", join_violations(.violations))]
    InvalidRequest {
        /// Every violation found.
        violations: Vec<Violation>,
    },

    /// A step contract did not hold.
    #[error("{step} {phase} contract violated: {}", join_violations(.violations))]
    ContractViolation {
        /// The step whose contract failed.
        step: PipelineStepKind,
        /// Entry or exit.
        phase: ContractPhase,
        /// Every violation found.
        violations: Vec<Violation>,
    },

    /// No pending manifest was found for a continuation.
    #[error("Tool call manifest {manifest_id} was not found.")]
    ManifestNotFound {
        /// The manifest key.
        manifest_id: String,
    },

    /// Client results could not be reconciled into the manifest.
    #[error("Could not reconcile client tool results for manifest {manifest_id}: {}", join_violations(.violations))]
    Reconciliation {
        /// The manifest key.
        manifest_id: String,
        /// Every violation found.
        violations: Vec<Violation>,
    },

    /// A server tool failed.
    #[error("Tool {tool} failed: {message}")]
    ToolExecution {
        /// The tool name.
        tool: String,
        /// The failure reason.
        message: String,
    },

    /// The reasoner loop ran out of iterations.
    #[error("Maximum reasoning iterations exceeded ({max}).")]
    MaxIterationsExceeded {
        /// The configured bound.
        max: usize,
    },

    /// A referenced entity was not found.
    #[error("{entity} {id} was not found.")]
    NotFound {
        /// Entity kind, e.g. "AgentSession".
        entity: &'static str,
        /// The id that was looked up.
        id: String,
    },

    /// The LLM client failed.
    #[error("LLM client failed: {0}")]
    Llm(String),

    /// The streaming reader failed.
    #[error("Stream error [{code}]: {message}")]
    Stream {
        /// One of the `STREAM_*` codes.
        code: &'static str,
        /// Details.
        message: String,
    },

    /// Optimistic concurrency check failed at persist.
    #[error("Session {session_id} was modified concurrently (expected version {expected}, found {actual}).")]
    SessionConflict {
        /// The session id.
        session_id: String,
        /// Version this request loaded.
        expected: u64,
        /// Version currently stored.
        actual: u64,
    },

    /// The request was cancelled.
    #[error("Pipeline aborted: {reason}")]
    Aborted {
        /// The cancellation reason.
        reason: String,
    },

    /// An ACP command failed.
    #[error("ACP command {command_id} failed: {message}")]
    AcpCommand {
        /// The command id.
        command_id: String,
        /// The failure reason.
        message: String,
    },

    /// A backing store failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Creates a request error from a single message.
    #[must_use]
    pub fn invalid_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            violations: vec![Violation::new(code, message)],
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Creates a stream error.
    #[must_use]
    pub fn stream(code: &'static str, message: impl Into<String>) -> Self {
        Self::Stream {
            code,
            message: message.into(),
        }
    }

    /// Returns the stable code for this error.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::InvalidRequest { .. } => codes::INVALID_REQUEST,
            Self::ContractViolation { .. } => codes::CONTRACT_VIOLATION,
            Self::ManifestNotFound { .. } => codes::MANIFEST_NOT_FOUND,
            Self::Reconciliation { .. } => codes::RECONCILIATION_FAILED,
            Self::ToolExecution { .. } => codes::TOOL_EXECUTION_FAILED,
            Self::MaxIterationsExceeded { .. } => codes::MAX_ITERATIONS_EXCEEDED,
            Self::NotFound { .. } => codes::NOT_FOUND,
            Self::Llm(_) => codes::LLM_FAILED,
            Self::Stream { code, .. } => *code,
            Self::SessionConflict { .. } => codes::SESSION_CONFLICT,
            Self::Aborted { .. } => codes::ABORTED,
            Self::AcpCommand { .. } => codes::ACP_COMMAND_FAILED,
            Self::Store(_) => codes::STORE_FAILED,
            Self::Serialization(_) | Self::Internal(_) => codes::INTERNAL,
        }
    }

    /// Returns the aggregated violations, if this error carries any.
    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::InvalidRequest { violations }
            | Self::ContractViolation { violations, .. }
            | Self::Reconciliation { violations, .. } => violations,
            _ => &[],
        }
    }

    /// Returns every message carried by this error.
    ///
    /// Aggregated errors yield one message per violation; everything else
    /// yields its display string.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        let violations = self.violations();
        if violations.is_empty() {
            vec![self.to_string()]
        } else {
            violations.iter().map(|v| v.message.clone()).collect()
        }
    }

    /// Returns true if this error signals a defect rather than bad input.
    #[must_use]
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::ContractViolation { .. })
    }

    /// Converts to structured error info for API responses.
    #[must_use]
    pub fn to_error_info(&self) -> ContractErrorInfo {
        let mut info = ContractErrorInfo::new(self.code(), self.to_string());

        if let Self::ContractViolation { step, phase, .. } = self {
            info = info
                .with_context("step", serde_json::json!(step.to_string()))
                .with_context("phase", serde_json::json!(phase.to_string()))
                .with_fix_hint("A pipeline step broke its contract; this is a defect, not a user error.");
        }

        let violations = self.violations();
        if !violations.is_empty() {
            info = info.with_context("violations", serde_json::json!(violations));
        }

        if let Self::SessionConflict { .. } = self {
            info = info.with_fix_hint("Reload the session and retry the request.");
        }

        info
    }
}

/// Structured metadata for surfaced errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Stable error code.
    pub code: String,
    /// Human-readable description.
    pub summary: String,
    /// Optional remediation guidance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_hint: Option<String>,
    /// Optional documentation link.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_url: Option<String>,
    /// Additional structured context.
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
}

impl ContractErrorInfo {
    /// Creates a new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            doc_url: None,
            context: HashMap::new(),
        }
    }

    /// Adds a fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a documentation URL.
    #[must_use]
    pub fn with_doc_url(mut self, url: impl Into<String>) -> Self {
        self.doc_url = Some(url.into());
        self
    }

    /// Adds a context entry.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_violation_code_and_messages() {
        let err = PipelineError::ContractViolation {
            step: PipelineStepKind::SessionRestorer,
            phase: ContractPhase::Post,
            violations: vec![
                Violation::new("A", "first"),
                Violation::new("B", "second"),
            ],
        };

        assert_eq!(err.code(), codes::CONTRACT_VIOLATION);
        assert_eq!(err.messages(), vec!["first".to_string(), "second".to_string()]);
        assert!(err.is_contract_violation());
        assert!(err.to_string().contains("SessionRestorer POST"));
    }

    #[test]
    fn test_plain_error_messages_use_display() {
        let err = PipelineError::MaxIterationsExceeded { max: 4 };
        assert_eq!(err.code(), codes::MAX_ITERATIONS_EXCEEDED);
        assert_eq!(err.messages(), vec!["Maximum reasoning iterations exceeded (4).".to_string()]);
    }

    #[test]
    fn test_stream_error_keeps_its_code() {
        let err = PipelineError::stream(codes::STREAM_CANCELLED, "cancelled");
        assert_eq!(err.code(), "STREAM_CANCELLED");
    }

    #[test]
    fn test_to_error_info_includes_violations() {
        let err = PipelineError::invalid_request("CORE_ORG_REQUIRED", "Envelope.Org is required.");
        let info = err.to_error_info();

        assert_eq!(info.code, codes::INVALID_REQUEST);
        assert!(info.context.contains_key("violations"));
    }

    #[test]
    fn test_conflict_error_info_has_hint() {
        let err = PipelineError::SessionConflict {
            session_id: "s1".into(),
            expected: 1,
            actual: 2,
        };
        let info = err.to_error_info();
        assert_eq!(info.code, codes::SESSION_CONFLICT);
        assert!(info.fix_hint.is_some());
    }

    #[test]
    fn test_error_info_serialization() {
        let info = ContractErrorInfo::new("X-1", "summary").with_doc_url("https://docs.example.com");
        let json = serde_json::to_string(&info).unwrap();
        let back: ContractErrorInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(info, back);
    }
}
