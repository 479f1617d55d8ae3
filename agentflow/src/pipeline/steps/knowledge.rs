use crate::config::PipelineConfig;
use crate::context::AgentPipelineContext;
use crate::knowledge::{render_kfr_block, ContextClassification, KnowledgePackSource};
use crate::pipeline::{PipelineStep, PipelineStepKind, StepResult, StepStatus};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Register holding the rendered Known Facts Registry block.
pub const KFR_REGISTER: &str = "kfr";

/// Rebuilds the turn's prompt knowledge from the knowledge source and the
/// session's KFR branch.
///
/// The tool call manifest is carried over untouched.
pub struct PromptKnowledgeProviderInitializer {
    source: Arc<dyn KnowledgePackSource>,
    config: Arc<PipelineConfig>,
}

impl PromptKnowledgeProviderInitializer {
    /// Creates the step.
    #[must_use]
    pub fn new(source: Arc<dyn KnowledgePackSource>, config: Arc<PipelineConfig>) -> Self {
        Self { source, config }
    }
}

impl fmt::Debug for PromptKnowledgeProviderInitializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptKnowledgeProviderInitializer")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PipelineStep for PromptKnowledgeProviderInitializer {
    fn kind(&self) -> PipelineStepKind {
        PipelineStepKind::PromptKnowledgeProviderInitializer
    }

    async fn execute_step(&self, ctx: &mut AgentPipelineContext) -> StepResult {
        let pack = self.source.build(ctx).await?;

        let kfr = ctx.session().map(|session| {
            let branch = session.branch_or(&self.config.default_branch);
            render_kfr_block(session.kfrs.get(branch).map(Vec::as_slice))
        });

        let knowledge = &mut ctx.knowledge;
        knowledge.clear_consumables();
        knowledge.clear_session();

        for block in &pack.kinds {
            if !block.session.is_empty() {
                knowledge
                    .get_or_create_register(&block.kind, ContextClassification::Session)
                    .add(block.render(&block.session));
            }
            if !block.consumable.is_empty() {
                knowledge
                    .get_or_create_register(&block.kind, ContextClassification::Consumable)
                    .add(block.render(&block.consumable));
            }
        }

        if let Some(kfr) = kfr {
            knowledge
                .get_or_create_register(KFR_REGISTER, ContextClassification::Session)
                .add(kfr);
        }

        knowledge.active_tools = pack.active_tools;
        knowledge.mark_populated();

        debug!(
            correlation_id = %ctx.correlation_id(),
            registers = ctx.knowledge.registers().len(),
            tools = ctx.knowledge.active_tools.len(),
            "Prompt knowledge initialized"
        );
        Ok(StepStatus::Completed)
    }
}
