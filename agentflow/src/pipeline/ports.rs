//! Collaborators injected into the steps.

use super::steps::LlmClient;
use crate::acp::AcpCommandRegistry;
use crate::config::PipelineConfig;
use crate::knowledge::{KnowledgePackSource, ModeKnowledgePackSource};
use crate::stores::{AgentContextStore, SessionStore, ToolManifestStore};
use crate::tools::ToolExecutor;
use std::sync::Arc;

/// Everything the step chains need from the outside world.
///
/// Steps receive clones of the `Arc`s they use; the ports themselves are
/// shared by every request a handler serves.
#[derive(Clone)]
pub struct PipelinePorts {
    /// Pipeline settings.
    pub config: Arc<PipelineConfig>,
    /// Session persistence.
    pub sessions: Arc<dyn SessionStore>,
    /// Agent context lookup.
    pub agent_contexts: Arc<dyn AgentContextStore>,
    /// Pending client tool manifests.
    pub manifests: Arc<dyn ToolManifestStore>,
    /// Server tool execution.
    pub tools: Arc<dyn ToolExecutor>,
    /// The model.
    pub llm: Arc<dyn LlmClient>,
    /// Prompt knowledge source.
    pub knowledge: Arc<dyn KnowledgePackSource>,
    /// ACP commands.
    pub acp: Arc<AcpCommandRegistry>,
}

impl std::fmt::Debug for PipelinePorts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelinePorts")
            .field("config", &self.config)
            .field("tools", &self.tools)
            .field("knowledge", &self.knowledge)
            .field("acp_commands", &self.acp.len())
            .finish_non_exhaustive()
    }
}

impl PipelinePorts {
    /// Creates ports with default config, mode-based knowledge and no ACP commands.
    #[must_use]
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        agent_contexts: Arc<dyn AgentContextStore>,
        manifests: Arc<dyn ToolManifestStore>,
        tools: Arc<dyn ToolExecutor>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self {
            config: Arc::new(PipelineConfig::default()),
            sessions,
            agent_contexts,
            manifests,
            tools,
            llm,
            knowledge: Arc::new(ModeKnowledgePackSource),
            acp: Arc::new(AcpCommandRegistry::new()),
        }
    }

    /// Sets the config.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    /// Sets the knowledge source.
    #[must_use]
    pub fn with_knowledge(mut self, knowledge: Arc<dyn KnowledgePackSource>) -> Self {
        self.knowledge = knowledge;
        self
    }

    /// Sets the ACP command registry.
    #[must_use]
    pub fn with_acp(mut self, acp: Arc<AcpCommandRegistry>) -> Self {
        self.acp = acp;
        self
    }
}
