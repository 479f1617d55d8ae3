//! Turns a finished context into the caller-facing response.

use super::step::contract_error;
use super::PipelineStepKind;
use crate::context::{AcpIntent, AgentPipelineContext, ResponseFile, ResponseType, Usage};
use crate::errors::{ContractPhase, PipelineError};
use crate::stores::ToolManifestStore;
use crate::validation::ContextValidator;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

/// What the caller has to do with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    /// The turn is complete.
    Final,
    /// Run the listed tools and post their results back.
    ClientToolContinuation,
    /// Pick one of the offered commands.
    Acp,
}

/// A tool the caller must run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientToolCall {
    /// Id to echo back with the result.
    pub tool_call_id: String,
    /// Tool name.
    pub name: String,
    /// Arguments as JSON text.
    pub arguments_json: String,
}

/// The response to one execute request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentExecuteResponse {
    /// Response kind.
    pub kind: ResponseKind,
    /// Session id; new for an initial request.
    pub session_id: String,
    /// Turn id to continue or follow on from.
    pub turn_id: String,
    /// Display name of the session's mode.
    pub mode_display_name: String,
    /// Answer text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_output_text: Option<String>,
    /// Token usage of the answering call.
    #[serde(default)]
    pub usage: Usage,
    /// Files produced by the model.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<ResponseFile>,
    /// Turn warnings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Client tools to run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ClientToolCall>,
    /// Text to show while client tools run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_continuation_message: Option<String>,
    /// Candidate commands for ambiguous input.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acp_intents: Vec<AcpIntent>,
}

/// Builds an [`AgentExecuteResponse`] after a successful chain.
///
/// A tool continuation stores the turn's manifest under
/// `{session}.{turn}` so the follow-up request can reconcile against it.
pub struct AgentExecuteResponseBuilder {
    manifests: Arc<dyn ToolManifestStore>,
    validator: ContextValidator,
}

impl AgentExecuteResponseBuilder {
    /// Creates a builder storing manifests in `manifests`.
    #[must_use]
    pub fn new(manifests: Arc<dyn ToolManifestStore>) -> Self {
        Self {
            manifests,
            validator: ContextValidator::new(),
        }
    }

    /// Builds the response for `ctx`.
    pub async fn build(
        &self,
        ctx: &AgentPipelineContext,
    ) -> Result<AgentExecuteResponse, PipelineError> {
        let report = self
            .validator
            .validate_pre_step(ctx, PipelineStepKind::ResponseBuilder);
        if !report.is_valid() {
            error!(
                correlation_id = %ctx.correlation_id(),
                violations = ?report.codes(),
                "Response cannot be built"
            );
            return Err(contract_error(
                PipelineStepKind::ResponseBuilder,
                ContractPhase::Pre,
                report,
            ));
        }

        let (Some(session), Some(turn)) = (ctx.session(), ctx.this_turn()) else {
            return Err(PipelineError::Internal(
                "Session and turn must be populated to build a response.".to_string(),
            ));
        };

        let mut response = AgentExecuteResponse {
            kind: ResponseKind::Final,
            session_id: session.id.clone(),
            turn_id: turn.id.clone(),
            mode_display_name: mode_display_name(ctx)?,
            primary_output_text: None,
            usage: Usage::default(),
            files: Vec::new(),
            warnings: turn.warnings.clone(),
            tool_calls: Vec::new(),
            tool_continuation_message: None,
            acp_intents: Vec::new(),
        };

        let response_type = ctx.response_type();
        match response_type {
            ResponseType::Final | ResponseType::Acp => {
                if let Some(payload) = ctx.response_payload() {
                    response.primary_output_text.clone_from(&payload.primary_output_text);
                    response.usage = payload.usage;
                    response.files.clone_from(&payload.files);
                    response.acp_intents.clone_from(&payload.acp_intents);
                }
                if response_type == ResponseType::Acp {
                    response.kind = ResponseKind::Acp;
                }
            }
            ResponseType::ToolContinuation => {
                let manifest = ctx.tool_manifest();
                response.kind = ResponseKind::ClientToolContinuation;
                response.tool_calls = manifest
                    .pending_client_calls()
                    .into_iter()
                    .map(|call| ClientToolCall {
                        tool_call_id: call.tool_call_id.clone(),
                        name: call.name.clone(),
                        arguments_json: call.arguments_json(),
                    })
                    .collect();
                if response.tool_calls.is_empty() {
                    return Err(PipelineError::Internal(
                        "ResponseType.ToolContinuation requires one or more client ToolCalls."
                            .to_string(),
                    ));
                }
                response
                    .tool_continuation_message
                    .clone_from(&manifest.tool_continuation_message);

                let manifest_id = format!("{}.{}", session.id, turn.id);
                self.manifests
                    .set_manifest(&manifest_id, &ctx.envelope().org().id, manifest)
                    .await?;
                debug!(
                    correlation_id = %ctx.correlation_id(),
                    manifest_id = %manifest_id,
                    client_calls = response.tool_calls.len(),
                    "Manifest stored for client continuation"
                );
            }
            ResponseType::NotReady => {
                return Err(PipelineError::Internal(
                    "ResponseType must not be NotReady.".to_string(),
                ));
            }
        }

        Ok(response)
    }
}

fn mode_display_name(ctx: &AgentPipelineContext) -> Result<String, PipelineError> {
    let key = ctx.session().map(|s| s.mode.as_str()).unwrap_or_default();
    match ctx.agent_context() {
        Some(agent) => agent
            .find_mode(key)
            .map(|mode| mode.name.clone())
            .ok_or_else(|| {
                PipelineError::Internal(format!("Agent mode '{key}' not found on agent context."))
            }),
        None => Ok(ctx.mode().map(|mode| mode.name.clone()).unwrap_or_default()),
    }
}

impl fmt::Debug for AgentExecuteResponseBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentExecuteResponseBuilder").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{RequestKind, ResponsePayload};
    use crate::stores::InMemoryToolManifestStore;
    use crate::testing::fixtures::{context, initial_request, with_agent, with_session};
    use crate::tools::{ToolCall, ToolCallResult};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ready_ctx() -> AgentPipelineContext {
        with_session(with_agent(context(RequestKind::Initial, initial_request("hi"))))
    }

    #[tokio::test]
    async fn test_final_response() {
        let store = Arc::new(InMemoryToolManifestStore::new());
        let mut ctx = ready_ctx();
        ctx.set_response_payload(ResponsePayload::text("Hello."));

        let response = AgentExecuteResponseBuilder::new(store.clone())
            .build(&ctx)
            .await
            .unwrap();

        assert_eq!(response.kind, ResponseKind::Final);
        assert_eq!(response.primary_output_text.as_deref(), Some("Hello."));
        assert_eq!(response.mode_display_name, "General");
        assert_eq!(response.session_id, ctx.session().unwrap().id);
        assert_eq!(store.set_count(), 0);
    }

    #[tokio::test]
    async fn test_tool_continuation_stores_manifest() {
        let store = Arc::new(InMemoryToolManifestStore::new());
        let mut ctx = ready_ctx();
        let mut call = ToolCall::new("tc_1", "open_file", json!({"path": "a.rs"}));
        call.requires_client_execution = true;
        let manifest = ctx.tool_manifest_mut();
        manifest.begin_batch(vec![call.clone()]);
        manifest.record_result(ToolCallResult::client_placeholder(&call));
        manifest.tool_continuation_message = Some("Opening the file".into());

        let response = AgentExecuteResponseBuilder::new(store.clone())
            .build(&ctx)
            .await
            .unwrap();

        assert_eq!(response.kind, ResponseKind::ClientToolContinuation);
        assert_eq!(
            response.tool_calls,
            vec![ClientToolCall {
                tool_call_id: "tc_1".into(),
                name: "open_file".into(),
                arguments_json: r#"{"path":"a.rs"}"#.into(),
            }]
        );
        assert_eq!(response.tool_continuation_message.as_deref(), Some("Opening the file"));
        let mid = ctx.tool_manifest_id().unwrap();
        assert!(store.contains(&mid, "org-1"));
        assert_eq!(store.set_count(), 1);
    }

    #[tokio::test]
    async fn test_not_ready_is_a_contract_violation() {
        let store = Arc::new(InMemoryToolManifestStore::new());
        let ctx = ready_ctx();

        let err = AgentExecuteResponseBuilder::new(store)
            .build(&ctx)
            .await
            .unwrap_err();

        assert!(err.is_contract_violation());
        assert_eq!(
            err.violations()[0].code,
            "RESPONSE_BUILDER_PRE_NOT_READY"
        );
    }

    #[tokio::test]
    async fn test_unknown_session_mode_fails() {
        let store = Arc::new(InMemoryToolManifestStore::new());
        let mut ctx = ready_ctx();
        ctx.session_mut().unwrap().mode = "missing".into();
        ctx.set_response_payload(ResponsePayload::text("Hello."));

        let err = AgentExecuteResponseBuilder::new(store)
            .build(&ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Agent mode 'missing' not found"));
    }
}
