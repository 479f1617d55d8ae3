//! Scripted model client and fixture tools.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::warn;

use crate::context::{AgentPipelineContext, ResponsePayload, Usage};
use crate::errors::PipelineError;
use crate::pipeline::LlmClient;
use crate::streaming::StreamingResponseReader;
use crate::tools::{
    AgentTool, AgentToolExecutionContext, AgentToolExecutor, ToolCall, ToolError, ToolRegistry,
};

/// One scripted model reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedTurn {
    /// A final answer.
    Final {
        /// Answer text.
        text: String,
        /// Reported usage.
        usage: Usage,
    },
    /// A batch of tool calls.
    ToolCalls {
        /// The calls, in order.
        calls: Vec<ToolCall>,
        /// Text shown while client tools run.
        continuation_message: Option<String>,
    },
    /// A streamed final answer, as raw SSE text.
    Stream {
        /// The event stream.
        sse: String,
    },
    /// A provider failure.
    Fail {
        /// The failure reason.
        message: String,
    },
}

/// An [`LlmClient`] replaying a fixed script.
///
/// Each call consumes the next [`ScriptedTurn`]; running out of script is
/// an error.
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<ScriptedTurn>>,
    calls: AtomicUsize,
    results_seen: Mutex<Vec<usize>>,
}

impl ScriptedLlmClient {
    /// Creates an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a reply.
    #[must_use]
    pub fn then(self, turn: ScriptedTurn) -> Self {
        self.script.lock().push_back(turn);
        self
    }

    /// Appends a final answer with no usage.
    #[must_use]
    pub fn then_final(self, text: &str) -> Self {
        self.then(ScriptedTurn::Final {
            text: text.to_string(),
            usage: Usage::default(),
        })
    }

    /// Appends a final answer reporting `total_tokens`.
    #[must_use]
    pub fn then_final_with_tokens(self, text: &str, total_tokens: u64) -> Self {
        self.then(ScriptedTurn::Final {
            text: text.to_string(),
            usage: Usage {
                prompt_tokens: total_tokens / 2,
                completion_tokens: total_tokens - total_tokens / 2,
                total_tokens,
                ..Usage::default()
            },
        })
    }

    /// Appends a tool call batch.
    #[must_use]
    pub fn then_tool_calls(self, calls: Vec<ToolCall>) -> Self {
        self.then(ScriptedTurn::ToolCalls {
            calls,
            continuation_message: None,
        })
    }

    /// Appends a tool call batch with a continuation message.
    #[must_use]
    pub fn then_client_calls(self, calls: Vec<ToolCall>, message: &str) -> Self {
        self.then(ScriptedTurn::ToolCalls {
            calls,
            continuation_message: Some(message.to_string()),
        })
    }

    /// Appends a streamed answer.
    #[must_use]
    pub fn then_stream(self, sse: &str) -> Self {
        self.then(ScriptedTurn::Stream {
            sse: sse.to_string(),
        })
    }

    /// Appends a failure.
    #[must_use]
    pub fn then_fail(self, message: &str) -> Self {
        self.then(ScriptedTurn::Fail {
            message: message.to_string(),
        })
    }

    /// Number of model calls made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Replies not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }

    /// Manifest result counts the model saw, one entry per call.
    #[must_use]
    pub fn results_seen(&self) -> Vec<usize> {
        self.results_seen.lock().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn invoke(&self, ctx: &mut AgentPipelineContext) -> Result<(), PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.results_seen.lock().push(ctx.tool_manifest().result_count());

        let turn = self.script.lock().pop_front();
        match turn {
            None => Err(PipelineError::Llm("no scripted reply left".to_string())),
            Some(ScriptedTurn::Final { text, usage }) => {
                ctx.set_response_payload(ResponsePayload::text(text).with_usage(usage));
                Ok(())
            }
            Some(ScriptedTurn::ToolCalls {
                calls,
                continuation_message,
            }) => {
                let manifest = ctx.tool_manifest_mut();
                manifest.begin_batch(calls);
                manifest.tool_continuation_message = continuation_message;
                Ok(())
            }
            Some(ScriptedTurn::Stream { sse }) => {
                let session_id = ctx.session().map(|s| s.id.clone()).unwrap_or_default();
                let reader = StreamingResponseReader::new(Arc::clone(ctx.progress()));
                let outcome = reader
                    .read(sse.as_bytes(), &session_id, ctx.cancellation())
                    .await?;
                ctx.set_response_payload(ResponsePayload {
                    primary_output_text: Some(outcome.partial_text),
                    response_id: outcome.response_id,
                    ..ResponsePayload::default()
                });
                Ok(())
            }
            Some(ScriptedTurn::Fail { message }) => Err(PipelineError::Llm(message)),
        }
    }
}

/// A server tool returning its arguments.
#[derive(Debug, Clone)]
pub struct EchoTool {
    name: String,
}

impl EchoTool {
    /// Creates the tool.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl AgentTool for EchoTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Returns its arguments."
    }

    async fn execute(
        &self,
        arguments: &serde_json::Value,
        _ctx: &AgentToolExecutionContext,
    ) -> Result<String, ToolError> {
        Ok(serde_json::json!({ "echo": arguments }).to_string())
    }
}

/// A server tool that always fails.
#[derive(Debug, Clone)]
pub struct FailingTool {
    name: String,
}

impl FailingTool {
    /// Creates the tool.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl AgentTool for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        _arguments: &serde_json::Value,
        _ctx: &AgentToolExecutionContext,
    ) -> Result<String, ToolError> {
        Err(ToolError::Failed(format!("{} is broken", self.name)))
    }
}

/// A tool whose side effect belongs to the client.
#[derive(Debug, Clone)]
pub struct ClientSideTool {
    name: String,
}

impl ClientSideTool {
    /// Creates the tool.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl AgentTool for ClientSideTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_fully_server(&self) -> bool {
        false
    }

    async fn execute(
        &self,
        _arguments: &serde_json::Value,
        _ctx: &AgentToolExecutionContext,
    ) -> Result<String, ToolError> {
        Err(ToolError::Failed(format!("{} runs on the client", self.name)))
    }
}

/// Registry with `echo`, `broken` (always fails) and `open_file` (client side).
#[must_use]
pub fn tool_registry() -> ToolRegistry {
    let registry = ToolRegistry::new();
    let tools: [Arc<dyn AgentTool>; 3] = [
        Arc::new(EchoTool::new("echo")),
        Arc::new(FailingTool::new("broken")),
        Arc::new(ClientSideTool::new("open_file")),
    ];
    for tool in tools {
        if let Err(err) = registry.register(tool) {
            warn!(error = %err, "Fixture tool not registered");
        }
    }
    registry
}

/// An executor over [`tool_registry`].
#[must_use]
pub fn tool_executor() -> Arc<AgentToolExecutor> {
    Arc::new(AgentToolExecutor::new(Arc::new(tool_registry())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestKind;
    use crate::testing::fixtures::{context, initial_request, with_session};

    #[tokio::test]
    async fn test_script_is_consumed_in_order() {
        let llm = ScriptedLlmClient::new()
            .then_tool_calls(vec![ToolCall::new("a", "echo", serde_json::json!({}))])
            .then_final("done");
        let mut ctx = context(RequestKind::Initial, initial_request("hi"));

        llm.invoke(&mut ctx).await.unwrap();
        assert!(ctx.has_pending_tool_calls());
        assert_eq!(llm.remaining(), 1);

        llm.invoke(&mut ctx).await.unwrap();
        assert_eq!(ctx.response_payload().and_then(|p| p.primary_output_text.as_deref()), Some("done"));

        let err = llm.invoke(&mut ctx).await.unwrap_err();
        assert!(matches!(err, PipelineError::Llm(_)));
        assert_eq!(llm.call_count(), 3);
    }

    #[tokio::test]
    async fn test_stream_turn_collects_deltas() {
        let sse = "event: response.output_text.delta\n\
                   data: {\"type\":\"response.output_text.delta\",\"delta\":\"Hel\"}\n\n\
                   data: {\"type\":\"response.output_text.delta\",\"delta\":\"lo\"}\n\n\
                   data: {\"type\":\"response.completed\",\"response\":{\"id\":\"resp_9\"}}\n\n\
                   data: [DONE]\n";
        let llm = ScriptedLlmClient::new().then_stream(sse);
        let mut ctx = with_session(context(RequestKind::Initial, initial_request("hi")));

        llm.invoke(&mut ctx).await.unwrap();

        let payload = ctx.response_payload().unwrap();
        assert_eq!(payload.primary_output_text.as_deref(), Some("Hello"));
        assert_eq!(payload.response_id.as_deref(), Some("resp_9"));
    }

    #[test]
    fn test_fixture_registry() {
        let registry = tool_registry();
        assert_eq!(registry.names(), vec!["broken", "echo", "open_file"]);
        assert!(!registry.get("open_file").unwrap().is_fully_server());
    }
}
