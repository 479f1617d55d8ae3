//! Session creation and restoration.

use crate::config::PipelineConfig;
use crate::context::{AgentPipelineContext, AgentSession, AgentSessionTurn, TurnStatus};
use crate::errors::PipelineError;
use crate::events::ProgressEvent;
use crate::pipeline::{PipelineStep, PipelineStepKind, StepResult, StepStatus};
use crate::stores::SessionStore;
use crate::utils::truncate_chars;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

fn new_turn(ctx: &AgentPipelineContext, session: &AgentSession, max_chars: usize) -> AgentSessionTurn {
    let mut turn = AgentSessionTurn::new(
        &session.id,
        session.next_sequence_number(),
        ctx.envelope().user().clone(),
    );
    turn.mode.clone_from(&session.mode);
    if let Some(instructions) = ctx.envelope().instructions() {
        let (summary, truncated) = truncate_chars(instructions, max_chars);
        turn.instruction_summary = summary;
        turn.instructions_truncated = truncated;
    }
    turn.set_status(TurnStatus::Pending);
    turn
}

async fn load_session(
    store: &dyn SessionStore,
    ctx: &AgentPipelineContext,
) -> Result<(AgentSession, String), PipelineError> {
    let envelope = ctx.envelope();
    let (Some(session_id), Some(turn_id)) = (envelope.session_id(), envelope.turn_id()) else {
        return Err(PipelineError::Internal(
            "Session and turn ids must be present to restore a session.".to_string(),
        ));
    };

    let session = store
        .get_session(&envelope.org().id, session_id)
        .await?
        .ok_or_else(|| PipelineError::not_found("AgentSession", session_id))?;

    if session.find_turn(turn_id).is_none() {
        return Err(PipelineError::not_found(
            "AgentSessionTurn",
            format!("{turn_id} in session {session_id}"),
        ));
    }

    Ok((session, turn_id.to_string()))
}

/// Creates the session and its first turn for an initial request.
#[derive(Debug)]
pub struct AgentSessionCreator {
    config: Arc<PipelineConfig>,
}

impl AgentSessionCreator {
    /// Creates the step.
    #[must_use]
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PipelineStep for AgentSessionCreator {
    fn kind(&self) -> PipelineStepKind {
        PipelineStepKind::AgentSessionCreator
    }

    async fn execute_step(&self, ctx: &mut AgentPipelineContext) -> StepResult {
        let envelope = ctx.envelope();
        let mut session = AgentSession::new(envelope.org().clone(), envelope.user().clone());

        if let Some(agent) = ctx.agent_context() {
            session.agent_context_id.clone_from(&agent.id);
        }
        if let Some(role) = ctx.conversation_context() {
            session.conversation_context_id.clone_from(&role.id);
        }
        session.mode = ctx
            .mode()
            .map_or_else(|| self.config.default_mode_key.clone(), |m| m.key.clone());
        session.current_branch.clone_from(&self.config.default_branch);

        let turn = new_turn(ctx, &session, self.config.answer_summary_max_chars);
        let session_id = session.id.clone();
        let turn_id = turn.id.clone();

        ctx.attach_session(session, turn);

        info!(
            correlation_id = %ctx.correlation_id(),
            session_id = %session_id,
            turn_id = %turn_id,
            "Session created"
        );
        ctx.publish(ProgressEvent::SessionStarted {
            session_id: session_id.clone(),
        })
        .await;
        ctx.publish(ProgressEvent::TurnCreated { session_id, turn_id }).await;
        Ok(StepStatus::Completed)
    }
}

/// Restores a session for a follow-on request and opens its next turn.
pub struct SessionRestorer {
    store: Arc<dyn SessionStore>,
    config: Arc<PipelineConfig>,
}

impl SessionRestorer {
    /// Creates the step.
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, config: Arc<PipelineConfig>) -> Self {
        Self { store, config }
    }
}

impl fmt::Debug for SessionRestorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRestorer").finish_non_exhaustive()
    }
}

#[async_trait]
impl PipelineStep for SessionRestorer {
    fn kind(&self) -> PipelineStepKind {
        PipelineStepKind::SessionRestorer
    }

    async fn execute_step(&self, ctx: &mut AgentPipelineContext) -> StepResult {
        let (session, previous_turn_id) = load_session(self.store.as_ref(), ctx).await?;
        let turn = new_turn(ctx, &session, self.config.answer_summary_max_chars);
        let session_id = session.id.clone();
        let turn_id = turn.id.clone();

        debug!(
            correlation_id = %ctx.correlation_id(),
            session_id = %session_id,
            previous_turn_id = %previous_turn_id,
            sequence_number = turn.sequence_number,
            "Session restored"
        );
        ctx.attach_session_with_previous(session, previous_turn_id, turn);
        ctx.publish(ProgressEvent::TurnCreated { session_id, turn_id }).await;
        Ok(StepStatus::Completed)
    }
}

/// Restores a session whose suspended turn is being continued.
///
/// No new turn is opened: the continued turn becomes this turn again.
pub struct ClientToolCallSessionRestorer {
    store: Arc<dyn SessionStore>,
}

impl ClientToolCallSessionRestorer {
    /// Creates the step.
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }
}

impl fmt::Debug for ClientToolCallSessionRestorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientToolCallSessionRestorer").finish_non_exhaustive()
    }
}

#[async_trait]
impl PipelineStep for ClientToolCallSessionRestorer {
    fn kind(&self) -> PipelineStepKind {
        PipelineStepKind::ClientToolCallSessionRestorer
    }

    async fn execute_step(&self, ctx: &mut AgentPipelineContext) -> StepResult {
        let (mut session, turn_id) = load_session(self.store.as_ref(), ctx).await?;

        if let Some(turn) = session.find_turn_mut(&turn_id) {
            if turn.status != TurnStatus::PendingClientTools {
                debug!(turn_id = %turn_id, status = ?turn.status, "Continuing a turn that was not suspended");
            }
            turn.set_status(TurnStatus::Pending);
        }

        debug!(
            correlation_id = %ctx.correlation_id(),
            session_id = %session.id,
            turn_id = %turn_id,
            "Session restored for tool continuation"
        );
        ctx.attach_client_tool_session(session, turn_id);
        Ok(StepStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AgentExecuteRequest, RequestKind};
    use crate::events::CollectingProgressSink;
    use crate::stores::InMemorySessionStore;
    use crate::testing::fixtures::{
        context, follow_on_request, initial_request, org, user, with_agent,
    };

    fn stored_session(store: &InMemorySessionStore) -> (String, String) {
        let mut session = AgentSession::new(org(), user());
        session.mode = "general".into();
        session.agent_context_id = "agent-1".into();
        let turn = AgentSessionTurn::new(&session.id, 1, user());
        let ids = (session.id.clone(), turn.id.clone());
        session.turns.push(turn);
        store.seed(session);
        ids
    }

    #[tokio::test]
    async fn test_creator_builds_session_and_first_turn() {
        let sink = Arc::new(CollectingProgressSink::new());
        let mut ctx = with_agent(context(RequestKind::Initial, initial_request("Summarize the repo")))
            .with_progress(sink.clone());
        let step = AgentSessionCreator::new(Arc::new(PipelineConfig::default()));

        step.execute_step(&mut ctx).await.unwrap();

        let session = ctx.session().unwrap();
        assert_eq!(session.agent_context_id, "agent-1");
        assert_eq!(session.conversation_context_id, "role-1");
        assert_eq!(session.mode, "general");
        assert_eq!(session.current_branch, "main");
        assert_eq!(session.version, 0);

        let turn = ctx.this_turn().unwrap();
        assert_eq!(turn.sequence_number, 1);
        assert_eq!(turn.instruction_summary, "Summarize the repo");
        assert_eq!(turn.status, TurnStatus::Pending);
        assert!(ctx.previous_turn().is_none());

        let types: Vec<&str> = sink.events().iter().map(ProgressEvent::event_type).collect();
        assert_eq!(types, vec!["session.started", "turn.created"]);
    }

    #[tokio::test]
    async fn test_creator_truncates_instruction_summary() {
        let config = PipelineConfig {
            answer_summary_max_chars: 5,
            ..PipelineConfig::default()
        };
        let mut ctx = with_agent(context(RequestKind::Initial, initial_request("abcdefghij")));
        AgentSessionCreator::new(Arc::new(config))
            .execute_step(&mut ctx)
            .await
            .unwrap();

        let turn = ctx.this_turn().unwrap();
        assert_eq!(turn.instruction_summary, "abcde");
        assert!(turn.instructions_truncated);
    }

    #[tokio::test]
    async fn test_restorer_opens_next_turn() {
        let store = Arc::new(InMemorySessionStore::new());
        let (session_id, turn_id) = stored_session(&store);
        let sink = Arc::new(CollectingProgressSink::new());
        let mut ctx = context(
            RequestKind::FollowOn,
            follow_on_request(&session_id, &turn_id, "and then?"),
        )
        .with_progress(sink.clone());

        SessionRestorer::new(store, Arc::new(PipelineConfig::default()))
            .execute_step(&mut ctx)
            .await
            .unwrap();

        let turn = ctx.this_turn().unwrap();
        assert_ne!(turn.id, turn_id);
        assert_eq!(turn.sequence_number, 2);
        assert_eq!(turn.mode, "general");
        assert_eq!(ctx.previous_turn().map(|t| t.id.as_str()), Some(turn_id.as_str()));
        assert_eq!(sink.events_of_type("turn.").len(), 1);
    }

    #[tokio::test]
    async fn test_restorer_reports_missing_session_and_turn() {
        let store = Arc::new(InMemorySessionStore::new());
        let (session_id, _) = stored_session(&store);
        let step = SessionRestorer::new(store, Arc::new(PipelineConfig::default()));

        let mut ctx = context(RequestKind::FollowOn, follow_on_request("nope", "t", "hi"));
        let err = step.execute_step(&mut ctx).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound { entity: "AgentSession", .. }));

        let mut ctx = context(RequestKind::FollowOn, follow_on_request(&session_id, "nope", "hi"));
        let err = step.execute_step(&mut ctx).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound { entity: "AgentSessionTurn", .. }));
        assert!(ctx.session().is_none());
    }

    #[tokio::test]
    async fn test_client_restorer_reuses_the_continued_turn() {
        let store = Arc::new(InMemorySessionStore::new());
        let (session_id, turn_id) = stored_session(&store);
        let request = AgentExecuteRequest {
            session_id: Some(session_id.clone()),
            turn_id: Some(turn_id.clone()),
            ..AgentExecuteRequest::default()
        };
        let mut ctx = context(RequestKind::ClientToolCallContinuation, request);

        ClientToolCallSessionRestorer::new(store)
            .execute_step(&mut ctx)
            .await
            .unwrap();

        assert_eq!(ctx.this_turn().map(|t| t.id.as_str()), Some(turn_id.as_str()));
        assert_eq!(ctx.session().map(|s| s.turns.len()), Some(1));
        assert_eq!(ctx.tool_manifest_id(), Some(format!("{session_id}.{turn_id}")));
    }
}
