//! Canned requests, identities and contexts.
//!
//! Every fixture uses the same tenant: org `org-1`, user `user-1` and
//! agent context `agent-1` with role `role-1`. The agent has a `general`
//! mode with the `echo` tool active and a `planning` mode with no tools.

use crate::context::{
    AgentContext, AgentExecuteRequest, AgentMode, AgentPipelineContext, AgentSession,
    AgentSessionTurn, ConversationContext, EntityRef, Envelope, RequestKind,
    ToolResultSubmission, TurnStatus,
};

/// The fixture organization.
#[must_use]
pub fn org() -> EntityRef {
    EntityRef::new("org-1", "Acme")
}

/// The fixture user.
#[must_use]
pub fn user() -> EntityRef {
    EntityRef::new("user-1", "Test User")
}

/// The fixture agent context.
#[must_use]
pub fn agent_context() -> AgentContext {
    AgentContext::new("agent-1", "org-1", "Assistant")
        .with_role(ConversationContext::new("role-1", "Engineer"))
        .with_mode(
            AgentMode::general("general")
                .with_tool("echo")
                .with_instruction("Answer briefly."),
        )
        .with_mode(AgentMode::new("planning", "Planning").with_instruction("Plan before acting."))
}

/// A request with no session.
#[must_use]
pub fn initial_request(instruction: &str) -> AgentExecuteRequest {
    AgentExecuteRequest {
        instruction: Some(instruction.to_string()),
        ..AgentExecuteRequest::default()
    }
}

/// A new instruction on an existing session.
#[must_use]
pub fn follow_on_request(session_id: &str, turn_id: &str, instruction: &str) -> AgentExecuteRequest {
    AgentExecuteRequest {
        session_id: Some(session_id.to_string()),
        turn_id: Some(turn_id.to_string()),
        instruction: Some(instruction.to_string()),
        ..AgentExecuteRequest::default()
    }
}

/// Client tool results for a suspended turn.
#[must_use]
pub fn continuation_request(
    session_id: &str,
    turn_id: &str,
    results: Vec<ToolResultSubmission>,
) -> AgentExecuteRequest {
    AgentExecuteRequest {
        session_id: Some(session_id.to_string()),
        turn_id: Some(turn_id.to_string()),
        tool_results: results,
        ..AgentExecuteRequest::default()
    }
}

/// A fresh context for `request` under the fixture identity.
#[must_use]
pub fn context(kind: RequestKind, request: AgentExecuteRequest) -> AgentPipelineContext {
    AgentPipelineContext::new(kind, Envelope::new(request, org(), user()))
}

/// Attaches the fixture agent, its role and the `general` mode.
#[must_use]
pub fn with_agent(mut ctx: AgentPipelineContext) -> AgentPipelineContext {
    let agent = agent_context();
    let role = ConversationContext::new("role-1", "Engineer");
    let mode = agent.find_mode("general").cloned();
    ctx.attach_agent_context(agent, role, mode);
    ctx
}

/// Attaches a new session with one pending turn.
#[must_use]
pub fn with_session(mut ctx: AgentPipelineContext) -> AgentPipelineContext {
    let mut session = AgentSession::new(org(), user());
    session.agent_context_id = "agent-1".into();
    session.conversation_context_id = "role-1".into();
    session.mode = "general".into();
    let mut turn = AgentSessionTurn::new(&session.id, 1, user());
    turn.mode = "general".into();
    turn.set_status(TurnStatus::Pending);
    ctx.attach_session(session, turn);
    ctx
}

/// A stored session with one turn in `status`, as the store would return it.
#[must_use]
pub fn stored_session(status: TurnStatus) -> AgentSession {
    let mut session = AgentSession::new(org(), user());
    session.agent_context_id = "agent-1".into();
    session.conversation_context_id = "role-1".into();
    session.mode = "general".into();
    session.current_branch = "main".into();
    let mut turn = AgentSessionTurn::new(&session.id, 1, user());
    turn.mode = "general".into();
    turn.set_status(status);
    session.turns.push(turn);
    session
}
