//! Agent context resolution for new sessions and loading for existing ones.

use crate::config::PipelineConfig;
use crate::context::{AgentContext, AgentPipelineContext, ConversationContext};
use crate::errors::PipelineError;
use crate::pipeline::{PipelineStep, PipelineStepKind, StepResult, StepStatus};
use crate::stores::AgentContextStore;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Adds the default mode when missing and saves the context if it changed.
async fn ensure_default_mode(
    store: &dyn AgentContextStore,
    agent: &mut AgentContext,
    mode_key: &str,
) -> Result<(), PipelineError> {
    if agent.ensure_mode(mode_key) {
        info!(agent_context_id = %agent.id, mode = %mode_key, "Added missing default mode");
        store.save_agent_context(agent).await?;
    }
    Ok(())
}

fn resolve_role(
    agent: &AgentContext,
    requested: Option<&str>,
) -> Result<ConversationContext, PipelineError> {
    agent.resolve_role(requested).cloned().ok_or_else(|| {
        PipelineError::not_found(
            "ConversationContext",
            requested.map_or_else(|| format!("default for agent context {}", agent.id), str::to_string),
        )
    })
}

/// Resolves the agent context, role and default mode for a new session.
///
/// The envelope's agent context id wins; without one the organization's
/// default context is used.
pub struct AgentContextResolver {
    store: Arc<dyn AgentContextStore>,
    config: Arc<PipelineConfig>,
}

impl AgentContextResolver {
    /// Creates the step.
    #[must_use]
    pub fn new(store: Arc<dyn AgentContextStore>, config: Arc<PipelineConfig>) -> Self {
        Self { store, config }
    }
}

impl fmt::Debug for AgentContextResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentContextResolver").finish_non_exhaustive()
    }
}

#[async_trait]
impl PipelineStep for AgentContextResolver {
    fn kind(&self) -> PipelineStepKind {
        PipelineStepKind::AgentContextResolver
    }

    async fn execute_step(&self, ctx: &mut AgentPipelineContext) -> StepResult {
        let org_id = ctx.envelope().org().id.clone();
        let requested = ctx.envelope().agent_context_id().map(str::to_string);

        let mut agent = match requested.as_deref() {
            Some(id) => self
                .store
                .get_agent_context(&org_id, id)
                .await?
                .ok_or_else(|| PipelineError::not_found("AgentContext", id))?,
            None => self
                .store
                .default_agent_context(&org_id)
                .await?
                .ok_or_else(|| {
                    PipelineError::not_found("AgentContext", format!("default for org {org_id}"))
                })?,
        };

        ensure_default_mode(self.store.as_ref(), &mut agent, &self.config.default_mode_key).await?;

        let role = resolve_role(&agent, ctx.envelope().conversation_context_id())?;
        let mode = agent.find_mode(&self.config.default_mode_key).cloned();

        debug!(
            correlation_id = %ctx.correlation_id(),
            agent_context_id = %agent.id,
            role = %role.id,
            "Agent context resolved"
        );
        ctx.attach_agent_context(agent, role, mode);
        Ok(StepStatus::Completed)
    }
}

/// Loads the agent context, role and mode recorded on an existing session.
pub struct AgentContextLoader {
    store: Arc<dyn AgentContextStore>,
    config: Arc<PipelineConfig>,
}

impl AgentContextLoader {
    /// Creates the step.
    #[must_use]
    pub fn new(store: Arc<dyn AgentContextStore>, config: Arc<PipelineConfig>) -> Self {
        Self { store, config }
    }
}

impl fmt::Debug for AgentContextLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentContextLoader").finish_non_exhaustive()
    }
}

#[async_trait]
impl PipelineStep for AgentContextLoader {
    fn kind(&self) -> PipelineStepKind {
        PipelineStepKind::AgentContextLoader
    }

    async fn execute_step(&self, ctx: &mut AgentPipelineContext) -> StepResult {
        let org_id = ctx.envelope().org().id.clone();
        let (agent_context_id, role_id, mode_key) = match ctx.session() {
            Some(session) => (
                session.agent_context_id.clone(),
                session.conversation_context_id.clone(),
                session.mode.clone(),
            ),
            None => return Err(PipelineError::Internal("No session is attached.".to_string())),
        };

        let mut agent = self
            .store
            .get_agent_context(&org_id, &agent_context_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("AgentContext", &agent_context_id))?;

        ensure_default_mode(self.store.as_ref(), &mut agent, &self.config.default_mode_key).await?;

        let requested_role = Some(role_id.as_str()).filter(|id| !id.trim().is_empty());
        let role = resolve_role(&agent, requested_role)?;

        let mode = if mode_key.trim().is_empty() {
            agent.find_mode(&self.config.default_mode_key).cloned()
        } else {
            Some(agent.find_mode(&mode_key).cloned().ok_or_else(|| {
                PipelineError::not_found("AgentMode", format!("{mode_key} on agent context {}", agent.id))
            })?)
        };

        debug!(
            correlation_id = %ctx.correlation_id(),
            agent_context_id = %agent.id,
            mode = %mode_key,
            "Agent context loaded"
        );
        ctx.attach_agent_context(agent, role, mode);
        Ok(StepStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AgentSession, AgentSessionTurn, RequestKind};
    use crate::stores::InMemoryAgentContextStore;
    use crate::testing::fixtures::{agent_context, context, initial_request, org, user};

    fn bare_agent() -> AgentContext {
        AgentContext::new("agent-2", "org-1", "Bare")
            .with_role(ConversationContext::new("role-x", "Only"))
    }

    #[tokio::test]
    async fn test_resolver_uses_org_default_and_ensures_mode() {
        let store = Arc::new(InMemoryAgentContextStore::new().with_context(bare_agent()));
        let step = AgentContextResolver::new(store.clone(), Arc::new(PipelineConfig::default()));
        let mut ctx = context(RequestKind::Initial, initial_request("hello"));

        step.execute_step(&mut ctx).await.unwrap();

        assert_eq!(ctx.agent_context().map(|a| a.id.as_str()), Some("agent-2"));
        assert_eq!(ctx.conversation_context().map(|r| r.id.as_str()), Some("role-x"));
        assert_eq!(ctx.mode().map(|m| m.key.as_str()), Some("general"));
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_resolver_does_not_save_when_mode_exists() {
        let store = Arc::new(InMemoryAgentContextStore::new().with_context(agent_context()));
        let step = AgentContextResolver::new(store.clone(), Arc::new(PipelineConfig::default()));
        let mut ctx = context(RequestKind::Initial, initial_request("hello"));

        step.execute_step(&mut ctx).await.unwrap();
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_resolver_reports_missing_context() {
        let store = Arc::new(InMemoryAgentContextStore::new());
        let step = AgentContextResolver::new(store, Arc::new(PipelineConfig::default()));
        let mut ctx = context(RequestKind::Initial, initial_request("hello"));

        let err = step.execute_step(&mut ctx).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound { entity: "AgentContext", .. }));
        assert!(ctx.agent_context().is_none());
    }

    #[tokio::test]
    async fn test_loader_restores_session_mode() {
        let store = Arc::new(InMemoryAgentContextStore::new().with_context(agent_context()));
        let step = AgentContextLoader::new(store, Arc::new(PipelineConfig::default()));
        let mut ctx = context(RequestKind::Initial, initial_request("hello"));

        let mut session = AgentSession::new(org(), user());
        session.agent_context_id = "agent-1".into();
        session.mode = "planning".into();
        let turn = AgentSessionTurn::new(&session.id, 1, user());
        ctx.attach_session(session, turn);

        step.execute_step(&mut ctx).await.unwrap();
        assert_eq!(ctx.mode().map(|m| m.key.as_str()), Some("planning"));
        assert_eq!(ctx.conversation_context().map(|r| r.id.as_str()), Some("role-1"));
    }

    #[tokio::test]
    async fn test_loader_rejects_unknown_mode() {
        let store = Arc::new(InMemoryAgentContextStore::new().with_context(agent_context()));
        let step = AgentContextLoader::new(store, Arc::new(PipelineConfig::default()));
        let mut ctx = context(RequestKind::Initial, initial_request("hello"));

        let mut session = AgentSession::new(org(), user());
        session.agent_context_id = "agent-1".into();
        session.mode = "retired".into();
        let turn = AgentSessionTurn::new(&session.id, 1, user());
        ctx.attach_session(session, turn);

        let err = step.execute_step(&mut ctx).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound { entity: "AgentMode", .. }));
    }
}
