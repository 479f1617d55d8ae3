use super::*;
use crate::tools::{ToolCall, ToolCallResult};
use pretty_assertions::assert_eq;
use serde_json::json;

fn envelope() -> Envelope {
    Envelope::new(
        AgentExecuteRequest {
            instruction: Some("hello".into()),
            ..AgentExecuteRequest::default()
        },
        EntityRef::new("org-1", "Org"),
        EntityRef::new("user-1", "User"),
    )
}

fn session() -> AgentSession {
    let mut session = AgentSession::new(EntityRef::new("org-1", "Org"), EntityRef::new("user-1", "User"));
    session.id = "sess_1".into();
    session
}

#[test]
fn test_new_context_is_empty() {
    let ctx = AgentPipelineContext::new(RequestKind::Initial, envelope());

    assert_eq!(ctx.kind(), RequestKind::Initial);
    assert!(ctx.session().is_none());
    assert!(ctx.this_turn().is_none());
    assert!(ctx.agent_context().is_none());
    assert_eq!(ctx.response_type(), ResponseType::NotReady);
    assert!(ctx.tool_manifest_id().is_none());
    assert!(!ctx.correlation_id().is_empty());
}

#[test]
fn test_attach_session_sets_this_turn() {
    let mut ctx = AgentPipelineContext::new(RequestKind::Initial, envelope());
    let turn = AgentSessionTurn::new("sess_1", 1, EntityRef::default());
    let turn_id = turn.id.clone();

    ctx.attach_session(session(), turn);

    assert_eq!(ctx.this_turn().map(|t| t.id.clone()), Some(turn_id.clone()));
    assert!(ctx.previous_turn().is_none());
    assert_eq!(ctx.tool_manifest_id(), Some(format!("sess_1.{turn_id}")));
}

#[test]
fn test_follow_on_attach_keeps_previous_turn() {
    let mut ctx = AgentPipelineContext::new(RequestKind::FollowOn, envelope());
    let mut session = session();
    let previous = AgentSessionTurn::new("sess_1", 1, EntityRef::default());
    let previous_id = previous.id.clone();
    session.turns.push(previous);

    let next = AgentSessionTurn::new("sess_1", 2, EntityRef::default());
    ctx.attach_session_with_previous(session, previous_id.clone(), next);

    assert_eq!(ctx.previous_turn().map(|t| t.id.as_str()), Some(previous_id.as_str()));
    assert_eq!(ctx.this_turn().map(|t| t.sequence_number), Some(2));
    assert_eq!(ctx.session().map(|s| s.turns.len()), Some(2));
}

#[test]
fn test_client_tool_session_reuses_turn() {
    let mut ctx = AgentPipelineContext::new(RequestKind::ClientToolCallContinuation, envelope());
    let mut session = session();
    session.turns.push(AgentSessionTurn {
        id: "turn_1".into(),
        ..AgentSessionTurn::default()
    });

    ctx.attach_client_tool_session(session, "turn_1");

    assert_eq!(ctx.this_turn().map(|t| t.id.as_str()), Some("turn_1"));
    assert_eq!(ctx.previous_turn().map(|t| t.id.as_str()), Some("turn_1"));
    assert_eq!(ctx.tool_manifest_id().as_deref(), Some("sess_1.turn_1"));
}

#[test]
fn test_response_type_is_derived() {
    let mut ctx = AgentPipelineContext::new(RequestKind::Initial, envelope());

    let call = ToolCall::new("tc_1", "client_tool", json!({}));
    ctx.tool_manifest_mut().begin_batch(vec![call.clone()]);
    ctx.tool_manifest_mut()
        .record_result(ToolCallResult::client_placeholder(&call));
    assert_eq!(ctx.response_type(), ResponseType::ToolContinuation);

    ctx.set_response_payload(ResponsePayload::text("done"));
    assert_eq!(ctx.response_type(), ResponseType::Final);

    let mut acp = ResponsePayload::default();
    acp.acp_intents.push(AcpIntent {
        command_id: "help".into(),
        display_name: "Help".into(),
        description: String::new(),
        args: Vec::new(),
    });
    ctx.set_response_payload(acp);
    assert_eq!(ctx.response_type(), ResponseType::Acp);
}

#[test]
fn test_terminal_and_tool_counts() {
    let mut ctx = AgentPipelineContext::new(RequestKind::Initial, envelope());
    assert!(!ctx.is_terminal());
    ctx.set_terminal("acp handled");
    assert_eq!(ctx.terminal_reason(), Some("acp handled"));

    ctx.add_tool_call("search");
    ctx.add_tool_call("search");
    assert_eq!(ctx.tool_call_count("search"), 2);
    assert_eq!(ctx.tool_call_count("other"), 0);
}

#[test]
fn test_tool_context_carries_identity() {
    let mut ctx = AgentPipelineContext::new(RequestKind::Initial, envelope())
        .with_correlation_id("corr-1");
    ctx.attach_session(session(), AgentSessionTurn::new("sess_1", 1, EntityRef::default()));

    let tool_ctx = ctx.to_tool_context();
    assert_eq!(tool_ctx.correlation_id, "corr-1");
    assert_eq!(tool_ctx.session_id.as_deref(), Some("sess_1"));
    assert_eq!(tool_ctx.org.id, "org-1");
    assert!(!tool_ctx.cancellation.is_cancelled());
}
