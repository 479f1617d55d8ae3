//! The bounded model/tool loop.

use crate::config::PipelineConfig;
use crate::context::{AgentPipelineContext, TurnStatus};
use crate::errors::PipelineError;
use crate::events::ProgressEvent;
use crate::knowledge::ContextClassification;
use crate::pipeline::{run_step, PipelineStep, PipelineStepKind, StepResult, StepStatus};
use crate::tools::{LoopGuardDecision, ToolCallResult, ToolExecutor, ToolLoopGuard};
use crate::utils::truncate_chars;
use crate::validation::ContextValidator;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Register receiving repeat-call warnings for the model.
pub const TOOL_LOOP_REGISTER: &str = "tool-loop";

/// The model.
///
/// An implementation reads the prompt knowledge from the context and
/// either sets a response payload or starts a new tool call batch on the
/// manifest. It may stream internally and publish deltas on the
/// context's progress sink.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Runs one model call against `ctx`.
    async fn invoke(&self, ctx: &mut AgentPipelineContext) -> Result<(), PipelineError>;
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// One model call, run under the `LLMClient` contract.
pub struct LlmClientStep {
    client: Arc<dyn LlmClient>,
    iteration: usize,
}

impl LlmClientStep {
    /// Creates the step for a 1-based reasoning iteration.
    #[must_use]
    pub fn new(client: Arc<dyn LlmClient>, iteration: usize) -> Self {
        Self { client, iteration }
    }
}

impl fmt::Debug for LlmClientStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmClientStep")
            .field("iteration", &self.iteration)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PipelineStep for LlmClientStep {
    fn kind(&self) -> PipelineStepKind {
        PipelineStepKind::LLMClient
    }

    async fn execute_step(&self, ctx: &mut AgentPipelineContext) -> StepResult {
        let iteration = self.iteration;
        ctx.publish(ProgressEvent::LlmStarted { iteration }).await;
        let start = Instant::now();

        match self.client.invoke(ctx).await {
            Ok(()) => {
                ctx.publish(ProgressEvent::LlmCompleted {
                    iteration,
                    elapsed_ms: elapsed_ms(start),
                })
                .await;
                Ok(StepStatus::Completed)
            }
            Err(err) => {
                ctx.publish(ProgressEvent::LlmFailed {
                    iteration,
                    error: err.to_string(),
                })
                .await;
                Err(err)
            }
        }
    }
}

/// Alternates model calls with server tool execution.
///
/// Each iteration calls the model. A response payload ends the loop. Otherwise
/// the pending calls run in manifest order; the first failure aborts the
/// turn. If client calls remain after the batch the turn is suspended so
/// the caller can hand them to the client. Running out of iterations is an
/// error.
pub struct Reasoner {
    llm: Arc<dyn LlmClient>,
    tools: Arc<dyn ToolExecutor>,
    config: Arc<PipelineConfig>,
    validator: ContextValidator,
}

impl Reasoner {
    /// Creates the step.
    #[must_use]
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tools: Arc<dyn ToolExecutor>,
        config: Arc<PipelineConfig>,
    ) -> Self {
        Self {
            llm,
            tools,
            config,
            validator: ContextValidator::new(),
        }
    }

    /// Runs every pending call of the current batch.
    ///
    /// Returns `Some` if cancellation was observed between calls.
    async fn execute_batch(
        &self,
        ctx: &mut AgentPipelineContext,
        guard: &mut ToolLoopGuard,
        has_results: &mut bool,
    ) -> Result<Option<StepStatus>, PipelineError> {
        let pending = ctx.tool_manifest().pending_calls().to_vec();

        for call in pending {
            if let Some(reason) = ctx.cancellation().checkpoint() {
                return Ok(Some(StepStatus::Aborted { reason }));
            }

            match guard.check(&call, *has_results) {
                LoopGuardDecision::Execute => {}
                LoopGuardDecision::Warn {
                    repeat_count,
                    message,
                } => {
                    warn!(tool = %call.name, repeat_count, correlation_id = %ctx.correlation_id(), "Repeated tool call");
                    ctx.knowledge
                        .get_or_create_register(TOOL_LOOP_REGISTER, ContextClassification::Consumable)
                        .add(message);
                }
                LoopGuardDecision::Suppress {
                    repeat_count,
                    result_json,
                } => {
                    warn!(tool = %call.name, repeat_count, correlation_id = %ctx.correlation_id(), "Repeated tool call suppressed");
                    ctx.tool_manifest_mut()
                        .record_result(ToolCallResult::success(&call, result_json));
                    *has_results = true;
                    continue;
                }
            }

            ctx.publish(ProgressEvent::ToolStarted {
                tool: call.name.clone(),
                tool_call_id: call.tool_call_id.clone(),
            })
            .await;
            let start = Instant::now();
            let tool_ctx = ctx.to_tool_context();

            match self.tools.execute(&call, &tool_ctx).await {
                Ok(execution) => {
                    if execution.was_executed {
                        ctx.publish(ProgressEvent::ToolCompleted {
                            tool: call.name.clone(),
                            tool_call_id: call.tool_call_id.clone(),
                            elapsed_ms: elapsed_ms(start),
                        })
                        .await;
                    } else {
                        debug!(tool = %call.name, tool_call_id = %call.tool_call_id, "Tool left for the client");
                    }
                    ctx.add_tool_call(&call.name);

                    let manifest = ctx.tool_manifest_mut();
                    let index = manifest.result_count();
                    if let Some(slot) = manifest.tool_calls.get_mut(index) {
                        *slot = execution.call;
                    }
                    manifest.record_result(execution.result);
                    *has_results = true;
                }
                Err(err) => {
                    ctx.publish(ProgressEvent::ToolFailed {
                        tool: call.name.clone(),
                        tool_call_id: call.tool_call_id.clone(),
                        error: err.to_string(),
                        elapsed_ms: elapsed_ms(start),
                    })
                    .await;
                    return Err(err);
                }
            }
        }

        Ok(None)
    }

    fn complete_turn(&self, ctx: &mut AgentPipelineContext) {
        let Some(payload) = ctx.response_payload() else {
            return;
        };
        let usage = payload.usage;
        let response_id = payload.response_id.clone();
        let (summary, truncated) = truncate_chars(
            payload.primary_output_text.as_deref().unwrap_or_default(),
            self.config.answer_summary_max_chars,
        );

        if let Some(turn) = ctx.this_turn_mut() {
            turn.agent_answer_summary = summary;
            turn.agent_answer_truncated = truncated;
            turn.response_id = response_id;
            turn.prompt_tokens = usage.prompt_tokens;
            turn.completion_tokens = usage.completion_tokens;
            turn.total_tokens = usage.total_tokens;
            turn.reasoning_tokens = usage.reasoning_tokens;
            turn.cached_tokens = usage.cached_tokens;
            turn.set_status(TurnStatus::Completed);
        }
        if let Some(session) = ctx.session_mut() {
            session.total_token_count += usage.total_tokens;
        }
    }
}

impl fmt::Debug for Reasoner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reasoner")
            .field("max_iterations", &self.config.max_reasoning_iterations)
            .field("tools", &self.tools)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PipelineStep for Reasoner {
    fn kind(&self) -> PipelineStepKind {
        PipelineStepKind::Reasoner
    }

    async fn execute_step(&self, ctx: &mut AgentPipelineContext) -> StepResult {
        let max = self.config.max_reasoning_iterations;
        let mut guard = ToolLoopGuard::new(self.config.loop_guard);
        let mut has_results = ctx.tool_manifest().result_count() > 0;

        for iteration in 1..=max {
            if let Some(reason) = ctx.cancellation().checkpoint() {
                return Ok(StepStatus::Aborted { reason });
            }
            debug!(correlation_id = %ctx.correlation_id(), iteration, max, "Reasoning iteration");

            let llm = LlmClientStep::new(Arc::clone(&self.llm), iteration);
            let status = run_step(&llm, &self.validator, ctx).await?;
            if status.is_aborted() {
                return Ok(status);
            }

            if ctx.response_payload().is_some() {
                self.complete_turn(ctx);
                info!(correlation_id = %ctx.correlation_id(), iteration, "Final answer produced");
                return Ok(StepStatus::Completed);
            }

            if let Some(aborted) = self.execute_batch(ctx, &mut guard, &mut has_results).await? {
                return Ok(aborted);
            }

            if ctx.has_client_tool_calls() {
                let pending = ctx.tool_manifest().pending_client_calls().len();
                if let Some(turn) = ctx.this_turn_mut() {
                    turn.set_status(TurnStatus::PendingClientTools);
                }
                info!(
                    correlation_id = %ctx.correlation_id(),
                    iteration,
                    client_calls = pending,
                    "Suspending for client tools"
                );
                return Ok(StepStatus::Completed);
            }
        }

        warn!(correlation_id = %ctx.correlation_id(), max, "Maximum reasoning iterations exceeded");
        Err(PipelineError::MaxIterationsExceeded { max })
    }
}
