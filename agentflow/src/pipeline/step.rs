//! The step abstraction and the contract-checking step runner.

use crate::context::{AgentPipelineContext, TraceEntry};
use crate::errors::{ContractPhase, PipelineError};
use crate::validation::{ContextValidator, ValidationReport};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::time::Instant;
use tracing::{debug, error, warn};

/// Identity of every step the validator knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PipelineStepKind {
    /// Top-level router.
    RequestHandler = 10,
    /// Restores a session for a follow-on request.
    SessionRestorer = 20,
    /// Resolves agent context and role for a new session.
    AgentContextResolver = 30,
    /// Restores the session for a tool continuation.
    ClientToolCallSessionRestorer = 35,
    /// Reconciles client tool results into the pending manifest.
    ClientToolContinuationResolver = 40,
    /// Creates a new session and its first turn.
    AgentSessionCreator = 50,
    /// Loads agent context and role for an existing session.
    AgentContextLoader = 60,
    /// Routes ACP commands.
    AcpCommandHandler = 65,
    /// Builds the turn's prompt knowledge.
    PromptKnowledgeProviderInitializer = 70,
    /// Bounded model/tool loop.
    Reasoner = 80,
    /// One model call.
    LLMClient = 90,
    /// Renders the external response.
    ResponseBuilder = 100,
}

impl PipelineStepKind {
    /// Every kind, in numeric order.
    pub const ALL: [Self; 12] = [
        Self::RequestHandler,
        Self::SessionRestorer,
        Self::AgentContextResolver,
        Self::ClientToolCallSessionRestorer,
        Self::ClientToolContinuationResolver,
        Self::AgentSessionCreator,
        Self::AgentContextLoader,
        Self::AcpCommandHandler,
        Self::PromptKnowledgeProviderInitializer,
        Self::Reasoner,
        Self::LLMClient,
        Self::ResponseBuilder,
    ];

    /// Display name used in contract messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::RequestHandler => "RequestHandler",
            Self::SessionRestorer => "SessionRestorer",
            Self::AgentContextResolver => "AgentContextResolver",
            Self::ClientToolCallSessionRestorer => "ClientToolCallSessionRestorer",
            Self::ClientToolContinuationResolver => "ClientToolContinuationResolver",
            Self::AgentSessionCreator => "AgentSessionCreator",
            Self::AgentContextLoader => "AgentContextLoader",
            Self::AcpCommandHandler => "AcpCommandHandler",
            Self::PromptKnowledgeProviderInitializer => "PromptKnowledgeProviderInitializer",
            Self::Reasoner => "Reasoner",
            Self::LLMClient => "LLMClient",
            Self::ResponseBuilder => "ResponseBuilder",
        }
    }

    /// Prefix for rule codes, e.g. `SESSION_RESTORER`.
    #[must_use]
    pub const fn code_prefix(self) -> &'static str {
        match self {
            Self::RequestHandler => "REQUEST_HANDLER",
            Self::SessionRestorer => "SESSION_RESTORER",
            Self::AgentContextResolver => "AGENT_CONTEXT_RESOLVER",
            Self::ClientToolCallSessionRestorer => "CLIENT_TOOL_CALL_SESSION_RESTORER",
            Self::ClientToolContinuationResolver => "CLIENT_TOOL_CONTINUATION_RESOLVER",
            Self::AgentSessionCreator => "AGENT_SESSION_CREATOR",
            Self::AgentContextLoader => "AGENT_CONTEXT_LOADER",
            Self::AcpCommandHandler => "ACP_COMMAND_HANDLER",
            Self::PromptKnowledgeProviderInitializer => "PROMPT_KNOWLEDGE_PROVIDER_INITIALIZER",
            Self::Reasoner => "REASONER",
            Self::LLMClient => "LLM_CLIENT",
            Self::ResponseBuilder => "RESPONSE_BUILDER",
        }
    }
}

impl fmt::Display for PipelineStepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a step finished when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    /// The step did its work.
    Completed,
    /// Cancellation was observed at a checkpoint.
    Aborted {
        /// The cancellation reason.
        reason: String,
    },
}

impl StepStatus {
    /// Returns true for [`StepStatus::Aborted`].
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

/// Result of running a step.
pub type StepResult = Result<StepStatus, PipelineError>;

/// One unit of pipeline work.
///
/// Implementations only do their own work; contract checks, cancellation
/// checkpoints and tracing are applied by [`run_step`].
#[async_trait]
pub trait PipelineStep: Send + Sync + Debug {
    /// Which step this is.
    fn kind(&self) -> PipelineStepKind;

    /// Performs the step's work on `ctx`.
    async fn execute_step(&self, ctx: &mut AgentPipelineContext) -> StepResult;
}

pub(crate) fn contract_error(
    step: PipelineStepKind,
    phase: ContractPhase,
    report: ValidationReport,
) -> PipelineError {
    PipelineError::ContractViolation {
        step,
        phase,
        violations: report.into_violations(),
    }
}

fn checkpoint(ctx: &AgentPipelineContext) -> Option<StepStatus> {
    ctx.cancellation()
        .checkpoint()
        .map(|reason| StepStatus::Aborted { reason })
}

/// Runs `step` inside its contract.
///
/// Order: pre-validate, cancellation check, execute, cancellation check,
/// post-validate, trace. Any failure short-circuits.
pub async fn run_step(
    step: &dyn PipelineStep,
    validator: &ContextValidator,
    ctx: &mut AgentPipelineContext,
) -> StepResult {
    let kind = step.kind();
    let start = Instant::now();
    debug!(step = %kind, correlation_id = %ctx.correlation_id(), "Step starting");

    let pre = validator.validate_pre_step(ctx, kind);
    if !pre.is_valid() {
        warn!(
            step = %kind,
            correlation_id = %ctx.correlation_id(),
            violations = ?pre.messages(),
            "Step entry contract violated"
        );
        return Err(contract_error(kind, ContractPhase::Pre, pre));
    }

    if let Some(aborted) = checkpoint(ctx) {
        warn!(step = %kind, correlation_id = %ctx.correlation_id(), "Step aborted before execution");
        return Ok(aborted);
    }

    let status = step.execute_step(ctx).await;

    let status = match status {
        Ok(StepStatus::Completed) => match checkpoint(ctx) {
            Some(aborted) => aborted,
            None => StepStatus::Completed,
        },
        Ok(aborted @ StepStatus::Aborted { .. }) => aborted,
        Err(err) => {
            warn!(
                step = %kind,
                correlation_id = %ctx.correlation_id(),
                code = err.code(),
                error = %err,
                "Step failed"
            );
            return Err(err);
        }
    };

    let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    if let StepStatus::Aborted { reason } = &status {
        warn!(step = %kind, correlation_id = %ctx.correlation_id(), reason = %reason, "Step aborted");
        ctx.record_trace(TraceEntry {
            step: kind,
            elapsed_ms,
            aborted: true,
        });
        return Ok(status);
    }

    let post = validator.validate_post_step(ctx, kind);
    if !post.is_valid() {
        error!(
            step = %kind,
            correlation_id = %ctx.correlation_id(),
            violations = ?post.messages(),
            "Step exit contract violated"
        );
        return Err(contract_error(kind, ContractPhase::Post, post));
    }

    ctx.record_trace(TraceEntry {
        step: kind,
        elapsed_ms,
        aborted: false,
    });
    debug!(step = %kind, correlation_id = %ctx.correlation_id(), elapsed_ms, "Step completed");
    Ok(StepStatus::Completed)
}
