use crate::acp::{AcpCommandRegistry, AcpCommandRouter, AcpRoute};
use crate::context::{AcpIntent, AgentPipelineContext, ResponsePayload};
use crate::errors::PipelineError;
use crate::pipeline::{PipelineStep, PipelineStepKind, StepResult, StepStatus};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Routes the instruction to an ACP command before the model sees it.
///
/// A single match runs the command and ends the chain. Several matches
/// end the chain with the candidates as ACP intents so the caller can
/// pick one.
#[derive(Debug)]
pub struct AcpCommandHandler {
    router: AcpCommandRouter,
}

impl AcpCommandHandler {
    /// Creates the step over `registry`.
    #[must_use]
    pub fn new(registry: Arc<AcpCommandRegistry>) -> Self {
        Self {
            router: AcpCommandRouter::new(registry),
        }
    }
}

#[async_trait]
impl PipelineStep for AcpCommandHandler {
    fn kind(&self) -> PipelineStepKind {
        PipelineStepKind::AcpCommandHandler
    }

    async fn execute_step(&self, ctx: &mut AgentPipelineContext) -> StepResult {
        let Some(instructions) = ctx.envelope().instructions() else {
            return Ok(StepStatus::Completed);
        };

        match self.router.route(instructions) {
            AcpRoute::NoMatch => {
                debug!(correlation_id = %ctx.correlation_id(), "No ACP command matched");
            }
            AcpRoute::Single { command_id, args } => {
                let command = self.router.registry().get(&command_id).ok_or_else(|| {
                    PipelineError::AcpCommand {
                        command_id: command_id.clone(),
                        message: "Command is not registered.".to_string(),
                    }
                })?;
                info!(correlation_id = %ctx.correlation_id(), command_id = %command_id, ?args, "Running ACP command");
                command.execute(ctx, &args).await?;
                ctx.set_terminal(format!("acp:{command_id}"));
            }
            AcpRoute::Multiple { candidates } => {
                let args = crate::acp::parse_args(instructions).unwrap_or_default();
                let intents: Vec<AcpIntent> = candidates
                    .iter()
                    .filter_map(|id| self.router.registry().descriptor(id))
                    .map(|d| AcpIntent {
                        command_id: d.command_id,
                        display_name: d.display_name,
                        description: d.description,
                        args: args.clone(),
                    })
                    .collect();
                info!(
                    correlation_id = %ctx.correlation_id(),
                    candidates = intents.len(),
                    "Ambiguous ACP input"
                );
                ctx.set_response_payload(ResponsePayload {
                    acp_intents: intents,
                    ..ResponsePayload::default()
                });
                ctx.set_terminal("acp:ambiguous");
            }
        }

        Ok(StepStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acp::{test_command, AcpCommand, ChangeModeCommand};
    use crate::context::{AgentSession, AgentSessionTurn, RequestKind, ResponseType};
    use crate::testing::fixtures::{context, initial_request, org, user, with_agent};

    fn ctx_with_session(instruction: &str) -> AgentPipelineContext {
        let mut ctx = with_agent(context(RequestKind::Initial, initial_request(instruction)));
        let mut session = AgentSession::new(org(), user());
        session.mode = "general".into();
        let turn = AgentSessionTurn::new(&session.id, 1, user());
        ctx.attach_session(session, turn);
        ctx
    }

    fn registry(commands: Vec<Arc<dyn AcpCommand>>) -> Arc<AcpCommandRegistry> {
        let registry = AcpCommandRegistry::new();
        for c in commands {
            registry.register(c).unwrap();
        }
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_plain_instruction_passes_through() {
        let step = AcpCommandHandler::new(registry(vec![Arc::new(ChangeModeCommand)]));
        let mut ctx = ctx_with_session("explain lifetimes");

        step.execute_step(&mut ctx).await.unwrap();
        assert!(!ctx.is_terminal());
        assert!(ctx.response_payload().is_none());
    }

    #[tokio::test]
    async fn test_single_match_runs_and_terminates() {
        let step = AcpCommandHandler::new(registry(vec![Arc::new(ChangeModeCommand)]));
        let mut ctx = ctx_with_session("/mode planning");

        step.execute_step(&mut ctx).await.unwrap();

        assert!(ctx.is_terminal());
        assert_eq!(ctx.session().map(|s| s.mode.as_str()), Some("planning"));
        assert_eq!(ctx.response_type(), ResponseType::Final);
    }

    #[tokio::test]
    async fn test_multiple_matches_become_intents() {
        let step = AcpCommandHandler::new(registry(vec![
            test_command("acp.alpha", "run"),
            test_command("acp.beta", "run"),
        ]));
        let mut ctx = ctx_with_session("run");

        step.execute_step(&mut ctx).await.unwrap();

        assert!(ctx.is_terminal());
        assert_eq!(ctx.response_type(), ResponseType::Acp);
        let ids: Vec<&str> = ctx
            .response_payload()
            .unwrap()
            .acp_intents
            .iter()
            .map(|i| i.command_id.as_str())
            .collect();
        assert_eq!(ids, vec!["acp.alpha", "acp.beta"]);
    }
}
