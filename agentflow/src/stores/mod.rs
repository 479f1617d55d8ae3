//! Persistence collaborators.
//!
//! The pipeline core only sees these traits:
//! - [`SessionStore`] for sessions and their embedded turns
//! - [`AgentContextStore`] for agent configuration
//! - [`ToolManifestStore`] for pending client tool manifests
//!
//! In-memory implementations backed by `dashmap` are provided for tests
//! and single-process hosts.

mod memory;

pub use memory::{InMemoryAgentContextStore, InMemorySessionStore, InMemoryToolManifestStore};

use crate::context::{AgentContext, AgentSession};
use crate::errors::PipelineError;
use crate::tools::ToolCallManifest;
use async_trait::async_trait;

/// Session persistence with optimistic concurrency.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Loads a session owned by `org_id`.
    async fn get_session(
        &self,
        org_id: &str,
        session_id: &str,
    ) -> Result<Option<AgentSession>, PipelineError>;

    /// Inserts a new session and returns its version, always 1.
    async fn insert_session(&self, session: &AgentSession) -> Result<u64, PipelineError>;

    /// Replaces a session whose stored version equals `session.version`.
    ///
    /// Returns the new version, or [`PipelineError::SessionConflict`] when
    /// another writer got there first.
    async fn update_session(&self, session: &AgentSession) -> Result<u64, PipelineError>;
}

/// Agent context lookup.
#[async_trait]
pub trait AgentContextStore: Send + Sync {
    /// Loads an agent context by id.
    async fn get_agent_context(
        &self,
        org_id: &str,
        agent_context_id: &str,
    ) -> Result<Option<AgentContext>, PipelineError>;

    /// Loads the organization's default agent context.
    async fn default_agent_context(
        &self,
        org_id: &str,
    ) -> Result<Option<AgentContext>, PipelineError>;

    /// Saves an agent context.
    async fn save_agent_context(&self, agent_context: &AgentContext) -> Result<(), PipelineError>;
}

/// Pending manifests keyed by `{session}.{turn}` within an organization.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToolManifestStore: Send + Sync {
    /// Loads a manifest.
    async fn get_manifest(
        &self,
        manifest_id: &str,
        org_id: &str,
    ) -> Result<Option<ToolCallManifest>, PipelineError>;

    /// Stores or replaces a manifest.
    async fn set_manifest(
        &self,
        manifest_id: &str,
        org_id: &str,
        manifest: &ToolCallManifest,
    ) -> Result<(), PipelineError>;

    /// Deletes a manifest; missing keys are not an error.
    async fn remove_manifest(&self, manifest_id: &str, org_id: &str) -> Result<(), PipelineError>;
}
