//! Server-side tool execution.

use super::{ToolCall, ToolCallResult, ToolRegistry};
use crate::cancellation::CancellationToken;
use crate::context::EntityRef;
use crate::errors::PipelineError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// What a tool sees of the pipeline.
#[derive(Debug, Clone)]
pub struct AgentToolExecutionContext {
    /// Request correlation id.
    pub correlation_id: String,
    /// Current session.
    pub session_id: Option<String>,
    /// Current turn.
    pub turn_id: Option<String>,
    /// Calling organization.
    pub org: EntityRef,
    /// Calling user.
    pub user: EntityRef,
    /// Agent context in use.
    pub agent_context_id: Option<String>,
    /// Active mode key.
    pub mode_key: Option<String>,
    /// Request cancellation.
    pub cancellation: Arc<CancellationToken>,
}

/// The outcome of handing one call to the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolExecution {
    /// The call, with its client flag resolved.
    pub call: ToolCall,
    /// The result row to append to the manifest.
    pub result: ToolCallResult,
    /// False when the call was left for the client.
    pub was_executed: bool,
}

/// Executes model tool calls.
#[async_trait]
pub trait ToolExecutor: Send + Sync + std::fmt::Debug {
    /// Executes `call`, or prepares a client placeholder for it.
    async fn execute(
        &self,
        call: &ToolCall,
        ctx: &AgentToolExecutionContext,
    ) -> Result<ToolExecution, PipelineError>;
}

/// Executes tools from a [`ToolRegistry`].
///
/// Tools that are not fully server-side are never run here; they yield a
/// placeholder result flagged for client execution.
#[derive(Debug, Clone)]
pub struct AgentToolExecutor {
    registry: Arc<ToolRegistry>,
}

impl AgentToolExecutor {
    /// Creates an executor over `registry`.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// The backing registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }
}

#[async_trait]
impl ToolExecutor for AgentToolExecutor {
    async fn execute(
        &self,
        call: &ToolCall,
        ctx: &AgentToolExecutionContext,
    ) -> Result<ToolExecution, PipelineError> {
        if call.name.trim().is_empty() {
            return Err(PipelineError::ToolExecution {
                tool: String::new(),
                message: format!("Tool name is required (ToolCallId '{}').", call.tool_call_id),
            });
        }

        let Some(tool) = self.registry.get(&call.name) else {
            warn!(tool = %call.name, correlation_id = %ctx.correlation_id, "Unknown tool requested");
            return Err(PipelineError::ToolExecution {
                tool: call.name.clone(),
                message: format!("Tool '{}' is not registered.", call.name),
            });
        };

        debug!(
            tool = %call.name,
            tool_call_id = %call.tool_call_id,
            correlation_id = %ctx.correlation_id,
            "tool.invoked"
        );

        let mut resolved = call.clone();
        resolved.requires_client_execution = !tool.is_fully_server();

        if resolved.requires_client_execution {
            let result = ToolCallResult::client_placeholder(&resolved);
            return Ok(ToolExecution {
                call: resolved,
                result,
                was_executed: false,
            });
        }

        let start = Instant::now();
        let output = tool.execute(&call.arguments, ctx).await;
        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        match output {
            Ok(result_json) => {
                let mut result = ToolCallResult::success(&resolved, result_json);
                result.execution_ms = Some(elapsed_ms);
                Ok(ToolExecution {
                    call: resolved,
                    result,
                    was_executed: true,
                })
            }
            Err(err) => Err(PipelineError::ToolExecution {
                tool: call.name.clone(),
                message: err.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ClientSideTool, EchoTool, FailingTool};
    use serde_json::json;

    fn tool_ctx() -> AgentToolExecutionContext {
        AgentToolExecutionContext {
            correlation_id: "corr".into(),
            session_id: Some("s".into()),
            turn_id: Some("t".into()),
            org: EntityRef::new("o", ""),
            user: EntityRef::new("u", ""),
            agent_context_id: None,
            mode_key: None,
            cancellation: Arc::new(CancellationToken::new()),
        }
    }

    fn executor() -> AgentToolExecutor {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new("echo"))).unwrap();
        registry.register(Arc::new(FailingTool::new("broken"))).unwrap();
        registry.register(Arc::new(ClientSideTool::new("open_file"))).unwrap();
        AgentToolExecutor::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_server_tool_returns_result() {
        let call = ToolCall::new("tc_1", "echo", json!({"text": "hi"}));
        let execution = executor().execute(&call, &tool_ctx()).await.unwrap();

        assert!(execution.was_executed);
        assert!(!execution.call.requires_client_execution);
        assert_eq!(execution.result.tool_call_id, "tc_1");
        assert!(execution.result.result_json.as_deref().is_some_and(|r| r.contains("hi")));
        assert!(execution.result.execution_ms.is_some());
    }

    #[tokio::test]
    async fn test_client_tool_yields_placeholder() {
        let call = ToolCall::new("tc_2", "open_file", json!({"path": "a.rs"}));
        let execution = executor().execute(&call, &tool_ctx()).await.unwrap();

        assert!(!execution.was_executed);
        assert!(execution.call.requires_client_execution);
        assert!(execution.result.is_pending_client());
    }

    #[tokio::test]
    async fn test_failures_are_errors() {
        let exec = executor();

        let err = exec
            .execute(&ToolCall::new("tc_3", "broken", json!({})), &tool_ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ToolExecution { ref tool, .. } if tool == "broken"));

        let err = exec
            .execute(&ToolCall::new("tc_4", "nope", json!({})), &tool_ctx())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not registered"));

        let err = exec
            .execute(&ToolCall::new("tc_5", " ", json!({})), &tool_ctx())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Tool name is required"));
    }
}
