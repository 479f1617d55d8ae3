//! Fixed step order per request kind.

use super::steps::{
    AcpCommandHandler, AgentContextLoader, AgentContextResolver, AgentSessionCreator,
    ClientToolCallSessionRestorer, ClientToolContinuationResolver,
    PromptKnowledgeProviderInitializer, Reasoner, SessionRestorer,
};
use super::{run_step, PipelinePorts, PipelineStep, PipelineStepKind, StepResult, StepStatus};
use crate::context::{AgentPipelineContext, RequestKind};
use crate::validation::ContextValidator;
use std::sync::Arc;
use tracing::{debug, info};

const INITIAL: [PipelineStepKind; 5] = [
    PipelineStepKind::AgentContextResolver,
    PipelineStepKind::AgentSessionCreator,
    PipelineStepKind::AcpCommandHandler,
    PipelineStepKind::PromptKnowledgeProviderInitializer,
    PipelineStepKind::Reasoner,
];

const FOLLOW_ON: [PipelineStepKind; 5] = [
    PipelineStepKind::SessionRestorer,
    PipelineStepKind::AgentContextLoader,
    PipelineStepKind::AcpCommandHandler,
    PipelineStepKind::PromptKnowledgeProviderInitializer,
    PipelineStepKind::Reasoner,
];

const CONTINUATION: [PipelineStepKind; 5] = [
    PipelineStepKind::ClientToolCallSessionRestorer,
    PipelineStepKind::ClientToolContinuationResolver,
    PipelineStepKind::AgentContextLoader,
    PipelineStepKind::PromptKnowledgeProviderInitializer,
    PipelineStepKind::Reasoner,
];

/// The step order for a request kind.
#[must_use]
pub const fn chain_kinds(kind: RequestKind) -> &'static [PipelineStepKind] {
    match kind {
        RequestKind::Initial => &INITIAL,
        RequestKind::FollowOn => &FOLLOW_ON,
        RequestKind::ClientToolCallContinuation => &CONTINUATION,
    }
}

/// An ordered list of steps run one after another.
///
/// The chain stops at the first failure, the first aborted step, or
/// the first step that marks the context terminal.
#[derive(Debug)]
pub struct PipelineChain {
    kind: RequestKind,
    steps: Vec<Arc<dyn PipelineStep>>,
    validator: ContextValidator,
}

impl PipelineChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new(kind: RequestKind) -> Self {
        Self {
            kind,
            steps: Vec::new(),
            validator: ContextValidator::new(),
        }
    }

    /// Builds the standard chain for `kind` over `ports`.
    #[must_use]
    pub fn for_kind(kind: RequestKind, ports: &PipelinePorts) -> Self {
        chain_kinds(kind)
            .iter()
            .filter_map(|step| build_step(*step, ports))
            .fold(Self::new(kind), Self::with_step)
    }

    /// Appends a step.
    #[must_use]
    pub fn with_step(mut self, step: Arc<dyn PipelineStep>) -> Self {
        self.steps.push(step);
        self
    }

    /// The request kind this chain serves.
    #[must_use]
    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    /// Step kinds in run order.
    #[must_use]
    pub fn step_kinds(&self) -> Vec<PipelineStepKind> {
        self.steps.iter().map(|s| s.kind()).collect()
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the chain has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs every step in order.
    pub async fn run(&self, ctx: &mut AgentPipelineContext) -> StepResult {
        debug!(chain = %self.kind, correlation_id = %ctx.correlation_id(), steps = self.steps.len(), "Chain starting");

        for step in &self.steps {
            let status = run_step(step.as_ref(), &self.validator, ctx).await?;
            if status.is_aborted() {
                return Ok(status);
            }
            if let Some(reason) = ctx.terminal_reason() {
                info!(
                    chain = %self.kind,
                    step = %step.kind(),
                    correlation_id = %ctx.correlation_id(),
                    reason = %reason,
                    "Chain ended early"
                );
                break;
            }
        }

        Ok(StepStatus::Completed)
    }
}

/// Instantiates a chain step; steps that never appear in a chain yield `None`.
fn build_step(kind: PipelineStepKind, ports: &PipelinePorts) -> Option<Arc<dyn PipelineStep>> {
    let step: Arc<dyn PipelineStep> = match kind {
        PipelineStepKind::AgentContextResolver => Arc::new(AgentContextResolver::new(
            Arc::clone(&ports.agent_contexts),
            Arc::clone(&ports.config),
        )),
        PipelineStepKind::AgentSessionCreator => {
            Arc::new(AgentSessionCreator::new(Arc::clone(&ports.config)))
        }
        PipelineStepKind::SessionRestorer => Arc::new(SessionRestorer::new(
            Arc::clone(&ports.sessions),
            Arc::clone(&ports.config),
        )),
        PipelineStepKind::ClientToolCallSessionRestorer => {
            Arc::new(ClientToolCallSessionRestorer::new(Arc::clone(&ports.sessions)))
        }
        PipelineStepKind::ClientToolContinuationResolver => Arc::new(
            ClientToolContinuationResolver::new(Arc::clone(&ports.manifests)),
        ),
        PipelineStepKind::AgentContextLoader => Arc::new(AgentContextLoader::new(
            Arc::clone(&ports.agent_contexts),
            Arc::clone(&ports.config),
        )),
        PipelineStepKind::AcpCommandHandler => {
            Arc::new(AcpCommandHandler::new(Arc::clone(&ports.acp)))
        }
        PipelineStepKind::PromptKnowledgeProviderInitializer => {
            Arc::new(PromptKnowledgeProviderInitializer::new(
                Arc::clone(&ports.knowledge),
                Arc::clone(&ports.config),
            ))
        }
        PipelineStepKind::Reasoner => Arc::new(Reasoner::new(
            Arc::clone(&ports.llm),
            Arc::clone(&ports.tools),
            Arc::clone(&ports.config),
        )),
        PipelineStepKind::LLMClient
        | PipelineStepKind::RequestHandler
        | PipelineStepKind::ResponseBuilder => return None,
    };
    Some(step)
}
