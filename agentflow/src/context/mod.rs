//! Request and session state.
//!
//! This module provides:
//! - The inbound [`AgentExecuteRequest`] and the immutable [`Envelope`]
//! - Persisted [`AgentSession`] / [`AgentSessionTurn`] state with KFR entries
//! - Agent configuration: [`AgentContext`], roles and modes
//! - [`AgentPipelineContext`], the mutable state every step works on

mod agent;
#[cfg(test)]
mod context_tests;
mod envelope;
mod payload;
mod pipeline_context;
mod session;

pub use agent::{AgentContext, AgentMode, ConversationContext};
pub use envelope::{
    AgentExecuteRequest, ClipboardImage, EntityRef, Envelope, InputArtifact, RagScope,
    ToolResultSubmission,
};
pub use payload::{AcpIntent, ResponseFile, ResponsePayload, ResponseType, Usage};
pub use pipeline_context::{AgentPipelineContext, RequestKind, TraceEntry};
pub use session::{AgentSession, AgentSessionTurn, KfrEntry, KfrKind, TurnStatus};
