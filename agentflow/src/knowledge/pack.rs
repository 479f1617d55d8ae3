use crate::context::AgentPipelineContext;
use crate::errors::PipelineError;
use async_trait::async_trait;

/// Content for one knowledge kind, with its framing markers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnowledgeKindBlock {
    /// Register name, e.g. `instructions`.
    pub kind: String,
    /// First line of the rendered block.
    pub begin_marker: String,
    /// Tells the model how to use the block.
    pub instruction_line: String,
    /// Last line of the rendered block.
    pub end_marker: String,
    /// Content sent once.
    pub consumable: Vec<String>,
    /// Content kept for the session.
    pub session: Vec<String>,
}

impl KnowledgeKindBlock {
    /// Creates a block with standard markers for `kind`.
    #[must_use]
    pub fn new(kind: impl Into<String>, instruction_line: impl Into<String>) -> Self {
        let kind = kind.into();
        let upper = kind.to_uppercase();
        Self {
            begin_marker: format!("### BEGIN {upper}"),
            end_marker: format!("### END {upper}"),
            instruction_line: instruction_line.into(),
            kind,
            consumable: Vec::new(),
            session: Vec::new(),
        }
    }

    /// Renders `items` framed by the markers.
    #[must_use]
    pub fn render(&self, items: &[String]) -> String {
        let mut out = String::new();
        for line in std::iter::once(&self.begin_marker)
            .chain(std::iter::once(&self.instruction_line))
            .chain(items)
            .chain(std::iter::once(&self.end_marker))
        {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

/// Everything the initializer needs to fill the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnowledgePack {
    /// Blocks by kind, in render order.
    pub kinds: Vec<KnowledgeKindBlock>,
    /// Tool names to offer the model.
    pub active_tools: Vec<String>,
}

/// Produces the knowledge pack for a turn.
#[async_trait]
pub trait KnowledgePackSource: Send + Sync + std::fmt::Debug {
    /// Builds the pack for the current context.
    async fn build(&self, ctx: &AgentPipelineContext) -> Result<KnowledgePack, PipelineError>;
}

/// Builds knowledge from the resolved role, the active mode and the envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModeKnowledgePackSource;

#[async_trait]
impl KnowledgePackSource for ModeKnowledgePackSource {
    async fn build(&self, ctx: &AgentPipelineContext) -> Result<KnowledgePack, PipelineError> {
        let mut pack = KnowledgePack::default();

        if let Some(role) = ctx.conversation_context() {
            let mut block =
                KnowledgeKindBlock::new("system_prompts", "Follow these role instructions.");
            block.session.extend(role.system_prompts.iter().cloned());
            pack.kinds.push(block);
        }

        if let Some(mode) = ctx.mode() {
            let mut block = KnowledgeKindBlock::new(
                "mode_instructions",
                format!("You are operating in mode '{}'.", mode.key),
            );
            block.session.extend(mode.instructions.iter().cloned());
            block.consumable.extend(mode.behavior_hints.iter().cloned());
            pack.kinds.push(block);
            pack.active_tools.extend(mode.active_tools.iter().cloned());
        }

        let artifacts = ctx.envelope().input_artifacts();
        if !artifacts.is_empty() {
            let mut block =
                KnowledgeKindBlock::new("input_artifacts", "The user attached these files.");
            block.consumable.extend(
                artifacts
                    .iter()
                    .map(|a| format!("--- {} ---\n{}", a.path, a.content)),
            );
            pack.kinds.push(block);
        }

        Ok(pack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_render_frames_items() {
        let block = KnowledgeKindBlock::new("notes", "Use these notes.");
        let rendered = block.render(&["one".to_string(), "two".to_string()]);
        assert_eq!(
            rendered,
            "### BEGIN NOTES\nUse these notes.\none\ntwo\n### END NOTES\n"
        );
    }
}
