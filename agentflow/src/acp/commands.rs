use super::{AcpArgRule, AcpCommand, AcpCommandDescriptor};
use crate::context::{AgentPipelineContext, ResponsePayload};
use crate::errors::PipelineError;
use async_trait::async_trait;
use tracing::info;

const COMMAND_ID: &str = "acp.change_mode";

/// `mode <key>`: switches the session to another mode of its agent context.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeModeCommand;

impl ChangeModeCommand {
    fn fail(message: String) -> PipelineError {
        PipelineError::AcpCommand {
            command_id: COMMAND_ID.to_string(),
            message,
        }
    }
}

#[async_trait]
impl AcpCommand for ChangeModeCommand {
    fn descriptor(&self) -> AcpCommandDescriptor {
        let descriptor = AcpCommandDescriptor::new(
            COMMAND_ID,
            "Change Mode",
            "Switches the session to another agent mode.",
        )
        .with_trigger("mode")
        .with_trigger("/mode")
        .with_args(1, 1);
        match AcpArgRule::new(0, r"^[A-Za-z0-9_.-]+$", true) {
            Ok(rule) => descriptor.with_arg_rule(rule),
            Err(_) => descriptor,
        }
    }

    async fn execute(
        &self,
        ctx: &mut AgentPipelineContext,
        args: &[String],
    ) -> Result<(), PipelineError> {
        let key = args
            .first()
            .ok_or_else(|| Self::fail("A mode key is required.".to_string()))?;

        let mode = ctx
            .agent_context()
            .and_then(|agent| agent.find_mode(key))
            .cloned()
            .ok_or_else(|| Self::fail(format!("Agent mode '{key}' not found on agent context.")))?;

        let session = ctx
            .session_mut()
            .ok_or_else(|| Self::fail("No session is attached.".to_string()))?;
        let previous = std::mem::replace(&mut session.mode, mode.key.clone());
        let session_id = session.id.clone();

        if let Some(turn) = ctx.this_turn_mut() {
            turn.mode.clone_from(&mode.key);
        }

        info!(session_id = %session_id, from = %previous, to = %mode.key, "Mode changed");

        let text = if mode.welcome_message.trim().is_empty() {
            format!("Switched to {} mode.", mode.name)
        } else {
            format!("Switched to {} mode. {}", mode.name, mode.welcome_message)
        };
        ctx.set_response_payload(ResponsePayload::text(text));
        ctx.set_mode(mode);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{
        AgentContext, AgentExecuteRequest, AgentMode, AgentSession, AgentSessionTurn,
        ConversationContext, EntityRef, Envelope, RequestKind,
    };

    fn ctx() -> AgentPipelineContext {
        let user = EntityRef::new("u-1", "Ada");
        let envelope = Envelope::new(
            AgentExecuteRequest {
                instruction: Some("mode review".into()),
                ..AgentExecuteRequest::default()
            },
            EntityRef::new("org-1", "Acme"),
            user.clone(),
        );
        let mut ctx = AgentPipelineContext::new(RequestKind::Initial, envelope);
        let mut session = AgentSession::new(EntityRef::new("org-1", "Acme"), user.clone());
        session.mode = "general".into();
        let turn = AgentSessionTurn::new(&session.id, 1, user);
        ctx.attach_session(session, turn);
        ctx.attach_agent_context(
            AgentContext::new("a-1", "org-1", "Agent")
                .with_mode(AgentMode::general("general"))
                .with_mode(AgentMode::new("review", "Review")),
            ConversationContext::new("r-1", "Default"),
            None,
        );
        ctx
    }

    #[tokio::test]
    async fn test_switches_session_mode() {
        let mut ctx = ctx();
        ChangeModeCommand
            .execute(&mut ctx, &["review".to_string()])
            .await
            .unwrap();

        assert_eq!(ctx.session().unwrap().mode, "review");
        assert_eq!(ctx.this_turn().unwrap().mode, "review");
        assert_eq!(ctx.mode().unwrap().key, "review");
        assert_eq!(
            ctx.response_payload()
                .and_then(|p| p.primary_output_text.as_deref()),
            Some("Switched to Review mode.")
        );
    }

    #[tokio::test]
    async fn test_unknown_mode_fails() {
        let mut ctx = ctx();
        let err = ChangeModeCommand
            .execute(&mut ctx, &["missing".to_string()])
            .await
            .unwrap_err();

        assert!(err.to_string().contains("missing"));
        assert_eq!(ctx.session().unwrap().mode, "general");
        assert!(ctx.response_payload().is_none());
    }
}
