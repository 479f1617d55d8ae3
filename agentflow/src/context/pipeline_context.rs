//! The mutable state threaded through every pipeline step.

use super::{
    AgentContext, AgentMode, AgentSession, AgentSessionTurn, ConversationContext, Envelope,
    ResponsePayload, ResponseType,
};
use crate::cancellation::CancellationToken;
use crate::events::{NoOpProgressSink, ProgressEvent, ProgressSink};
use crate::knowledge::PromptKnowledgeProvider;
use crate::pipeline::PipelineStepKind;
use crate::tools::{AgentToolExecutionContext, ToolCallManifest};
use crate::utils::{generate_correlation_id, iso_timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Which entry chain a request takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// No session yet.
    Initial,
    /// A new instruction on an existing session.
    FollowOn,
    /// Client tool results for a suspended turn.
    ClientToolCallContinuation,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial => write!(f, "Initial"),
            Self::FollowOn => write!(f, "FollowOn"),
            Self::ClientToolCallContinuation => write!(f, "ClientToolCallContinuation"),
        }
    }
}

/// One executed step, recorded for auditing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEntry {
    /// The step that ran.
    pub step: PipelineStepKind,
    /// Wall time in milliseconds.
    pub elapsed_ms: u64,
    /// True if the step returned an aborted status.
    pub aborted: bool,
}

/// Mutable aggregate root owned by exactly one request.
///
/// The context enforces nothing about its own consistency; step contracts
/// are checked externally by the validator.
pub struct AgentPipelineContext {
    kind: RequestKind,
    timestamp: String,
    correlation_id: String,
    envelope: Envelope,
    cancellation: Arc<CancellationToken>,
    session: Option<AgentSession>,
    this_turn_id: Option<String>,
    previous_turn_id: Option<String>,
    agent_context: Option<AgentContext>,
    conversation_context: Option<ConversationContext>,
    mode: Option<AgentMode>,
    /// Prompt knowledge for this turn, including the tool call manifest.
    pub knowledge: PromptKnowledgeProvider,
    response_payload: Option<ResponsePayload>,
    terminal_reason: Option<String>,
    trace: Vec<TraceEntry>,
    progress: Arc<dyn ProgressSink>,
    tool_call_counts: HashMap<String, u32>,
}

impl AgentPipelineContext {
    /// Creates a context for one request.
    #[must_use]
    pub fn new(kind: RequestKind, envelope: Envelope) -> Self {
        Self {
            kind,
            timestamp: iso_timestamp(),
            correlation_id: generate_correlation_id(),
            envelope,
            cancellation: Arc::new(CancellationToken::new()),
            session: None,
            this_turn_id: None,
            previous_turn_id: None,
            agent_context: None,
            conversation_context: None,
            mode: None,
            knowledge: PromptKnowledgeProvider::new(),
            response_payload: None,
            terminal_reason: None,
            trace: Vec::new(),
            progress: Arc::new(NoOpProgressSink),
            tool_call_counts: HashMap::new(),
        }
    }

    /// Shares a cancellation token with the caller.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancellation = token;
        self
    }

    /// Sets the progress sink.
    #[must_use]
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    /// Overrides the correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// Overrides the creation timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    /// Request kind.
    #[must_use]
    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    /// Creation timestamp.
    #[must_use]
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Correlation id.
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// The immutable envelope.
    #[must_use]
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// The cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &Arc<CancellationToken> {
        &self.cancellation
    }

    /// The progress sink.
    #[must_use]
    pub fn progress(&self) -> &Arc<dyn ProgressSink> {
        &self.progress
    }

    /// Publishes a progress event.
    pub async fn publish(&self, event: ProgressEvent) {
        self.progress.publish(event).await;
    }

    // --- session -----------------------------------------------------

    /// The attached session.
    #[must_use]
    pub fn session(&self) -> Option<&AgentSession> {
        self.session.as_ref()
    }

    /// The attached session, mutably.
    pub fn session_mut(&mut self) -> Option<&mut AgentSession> {
        self.session.as_mut()
    }

    /// The turn this request is producing.
    #[must_use]
    pub fn this_turn(&self) -> Option<&AgentSessionTurn> {
        let id = self.this_turn_id.as_deref()?;
        self.session.as_ref()?.find_turn(id)
    }

    /// The turn this request is producing, mutably.
    pub fn this_turn_mut(&mut self) -> Option<&mut AgentSessionTurn> {
        let id = self.this_turn_id.as_deref()?;
        self.session.as_mut()?.find_turn_mut(id)
    }

    /// The turn this request follows.
    #[must_use]
    pub fn previous_turn(&self) -> Option<&AgentSessionTurn> {
        let id = self.previous_turn_id.as_deref()?;
        self.session.as_ref()?.find_turn(id)
    }

    /// Attaches a new session and its first turn.
    pub fn attach_session(&mut self, mut session: AgentSession, turn: AgentSessionTurn) {
        self.this_turn_id = Some(turn.id.clone());
        self.previous_turn_id = None;
        session.turns.push(turn);
        self.session = Some(session);
    }

    /// Attaches a restored session, the turn it follows and a new turn.
    pub fn attach_session_with_previous(
        &mut self,
        mut session: AgentSession,
        previous_turn_id: impl Into<String>,
        this_turn: AgentSessionTurn,
    ) {
        self.previous_turn_id = Some(previous_turn_id.into());
        self.this_turn_id = Some(this_turn.id.clone());
        session.turns.push(this_turn);
        self.session = Some(session);
    }

    /// Attaches a restored session whose existing turn is being continued.
    pub fn attach_client_tool_session(&mut self, session: AgentSession, turn_id: impl Into<String>) {
        let turn_id = turn_id.into();
        self.previous_turn_id = Some(turn_id.clone());
        self.this_turn_id = Some(turn_id);
        self.session = Some(session);
    }

    // --- agent -------------------------------------------------------

    /// Attaches the agent context, role and mode.
    pub fn attach_agent_context(
        &mut self,
        agent_context: AgentContext,
        role: ConversationContext,
        mode: Option<AgentMode>,
    ) {
        self.agent_context = Some(agent_context);
        self.conversation_context = Some(role);
        self.mode = mode;
    }

    /// The agent context.
    #[must_use]
    pub fn agent_context(&self) -> Option<&AgentContext> {
        self.agent_context.as_ref()
    }

    /// The resolved role.
    #[must_use]
    pub fn conversation_context(&self) -> Option<&ConversationContext> {
        self.conversation_context.as_ref()
    }

    /// The active mode.
    #[must_use]
    pub fn mode(&self) -> Option<&AgentMode> {
        self.mode.as_ref()
    }

    /// Replaces the active mode.
    pub fn set_mode(&mut self, mode: AgentMode) {
        self.mode = Some(mode);
    }

    // --- response ----------------------------------------------------

    /// Sets the response payload.
    pub fn set_response_payload(&mut self, payload: ResponsePayload) {
        self.response_payload = Some(payload);
    }

    /// The response payload.
    #[must_use]
    pub fn response_payload(&self) -> Option<&ResponsePayload> {
        self.response_payload.as_ref()
    }

    /// Stops the chain early with success.
    pub fn set_terminal(&mut self, reason: impl Into<String>) {
        self.terminal_reason = Some(reason.into());
    }

    /// Returns true once a step has ended the chain.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.terminal_reason.is_some()
    }

    /// Why the chain ended early.
    #[must_use]
    pub fn terminal_reason(&self) -> Option<&str> {
        self.terminal_reason.as_deref()
    }

    /// The tool call manifest.
    #[must_use]
    pub fn tool_manifest(&self) -> &ToolCallManifest {
        &self.knowledge.tool_call_manifest
    }

    /// The tool call manifest, mutably.
    pub fn tool_manifest_mut(&mut self) -> &mut ToolCallManifest {
        &mut self.knowledge.tool_call_manifest
    }

    /// Replaces the tool call manifest.
    pub fn attach_tool_manifest(&mut self, manifest: ToolCallManifest) {
        self.knowledge.tool_call_manifest = manifest;
    }

    /// Returns true if model calls are waiting to run.
    #[must_use]
    pub fn has_pending_tool_calls(&self) -> bool {
        self.tool_manifest().has_pending_tool_calls()
    }

    /// Returns true if placeholders are waiting on the client.
    #[must_use]
    pub fn has_client_tool_calls(&self) -> bool {
        self.tool_manifest().has_client_tool_calls()
    }

    /// Derives the response type from the payload and the manifest.
    #[must_use]
    pub fn response_type(&self) -> ResponseType {
        match &self.response_payload {
            Some(payload) if !payload.acp_intents.is_empty() => ResponseType::Acp,
            Some(_) => ResponseType::Final,
            None if self.has_client_tool_calls() => ResponseType::ToolContinuation,
            None => ResponseType::NotReady,
        }
    }

    /// Manifest store key, `{session}.{turn}`.
    #[must_use]
    pub fn tool_manifest_id(&self) -> Option<String> {
        let session = self.session.as_ref()?;
        let turn = self.this_turn_id.as_deref()?;
        Some(format!("{}.{turn}", session.id))
    }

    // --- bookkeeping -------------------------------------------------

    /// Records a completed step.
    pub fn record_trace(&mut self, entry: TraceEntry) {
        self.trace.push(entry);
    }

    /// Steps run so far, in order.
    #[must_use]
    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    /// Times `tool` has been called in this request.
    #[must_use]
    pub fn tool_call_count(&self, tool: &str) -> u32 {
        self.tool_call_counts.get(tool).copied().unwrap_or(0)
    }

    /// Increments the call count for `tool`.
    pub fn add_tool_call(&mut self, tool: &str) {
        *self.tool_call_counts.entry(tool.to_string()).or_insert(0) += 1;
    }

    /// Builds the context handed to tools.
    #[must_use]
    pub fn to_tool_context(&self) -> AgentToolExecutionContext {
        AgentToolExecutionContext {
            correlation_id: self.correlation_id.clone(),
            session_id: self.session.as_ref().map(|s| s.id.clone()),
            turn_id: self.this_turn_id.clone(),
            org: self.envelope.org().clone(),
            user: self.envelope.user().clone(),
            agent_context_id: self.agent_context.as_ref().map(|a| a.id.clone()),
            mode_key: self.mode.as_ref().map(|m| m.key.clone()),
            cancellation: Arc::clone(&self.cancellation),
        }
    }
}

impl fmt::Debug for AgentPipelineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentPipelineContext")
            .field("kind", &self.kind)
            .field("correlation_id", &self.correlation_id)
            .field("session_id", &self.session.as_ref().map(|s| &s.id))
            .field("this_turn_id", &self.this_turn_id)
            .field("previous_turn_id", &self.previous_turn_id)
            .field("response_type", &self.response_type())
            .field("terminal_reason", &self.terminal_reason)
            .finish_non_exhaustive()
    }
}
