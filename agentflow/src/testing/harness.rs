//! An [`AgentRequestHandler`] wired to in-memory collaborators.

use std::sync::Arc;
use tracing::warn;

use super::fixtures::{agent_context, org, user};
use super::mocks::{tool_executor, ScriptedLlmClient};
use crate::acp::{AcpCommandRegistry, ChangeModeCommand};
use crate::cancellation::CancellationToken;
use crate::context::{AgentExecuteRequest, AgentSession};
use crate::errors::PipelineError;
use crate::events::CollectingProgressSink;
use crate::pipeline::{AgentExecuteResponse, AgentRequestHandler, PipelinePorts};
use crate::stores::{InMemoryAgentContextStore, InMemorySessionStore, InMemoryToolManifestStore};

/// A handler over in-memory stores, the fixture tools and a scripted model.
///
/// The stores are exposed so tests can seed state and count writes.
#[derive(Debug)]
pub struct PipelineHarness {
    /// Session store.
    pub sessions: Arc<InMemorySessionStore>,
    /// Agent context store, seeded with the fixture agent.
    pub agent_contexts: Arc<InMemoryAgentContextStore>,
    /// Manifest store.
    pub manifests: Arc<InMemoryToolManifestStore>,
    /// The scripted model.
    pub llm: Arc<ScriptedLlmClient>,
    /// Every progress event of every request.
    pub progress: Arc<CollectingProgressSink>,
    handler: AgentRequestHandler,
}

impl PipelineHarness {
    /// Creates a harness with default ports.
    #[must_use]
    pub fn new(llm: ScriptedLlmClient) -> Self {
        Self::with_ports(llm, |ports| ports)
    }

    /// Creates a harness, letting `configure` adjust the ports first.
    #[must_use]
    pub fn with_ports(
        llm: ScriptedLlmClient,
        configure: impl FnOnce(PipelinePorts) -> PipelinePorts,
    ) -> Self {
        let sessions = Arc::new(InMemorySessionStore::new());
        let agent_contexts = Arc::new(InMemoryAgentContextStore::new().with_context(agent_context()));
        let manifests = Arc::new(InMemoryToolManifestStore::new());
        let llm = Arc::new(llm);

        let acp = AcpCommandRegistry::new();
        if let Err(err) = acp.register(Arc::new(ChangeModeCommand)) {
            warn!(error = %err, "Fixture command not registered");
        }

        let ports = PipelinePorts::new(
            sessions.clone(),
            agent_contexts.clone(),
            manifests.clone(),
            tool_executor(),
            llm.clone(),
        )
        .with_acp(Arc::new(acp));

        Self {
            handler: AgentRequestHandler::new(configure(ports)),
            sessions,
            agent_contexts,
            manifests,
            llm,
            progress: Arc::new(CollectingProgressSink::new()),
        }
    }

    /// The handler under test.
    #[must_use]
    pub fn handler(&self) -> &AgentRequestHandler {
        &self.handler
    }

    /// Runs a request as the fixture user.
    pub async fn execute(
        &self,
        request: AgentExecuteRequest,
    ) -> Result<AgentExecuteResponse, PipelineError> {
        self.execute_with_cancellation(request, Arc::new(CancellationToken::new()))
            .await
    }

    /// Runs a request with a caller-held cancellation token.
    pub async fn execute_with_cancellation(
        &self,
        request: AgentExecuteRequest,
        cancellation: Arc<CancellationToken>,
    ) -> Result<AgentExecuteResponse, PipelineError> {
        self.handler
            .handle_with(request, org(), user(), self.progress.clone(), cancellation)
            .await
    }

    /// The stored copy of a fixture-org session.
    #[must_use]
    pub fn stored_session(&self, session_id: &str) -> Option<AgentSession> {
        self.sessions.snapshot(&org().id, session_id)
    }
}
