use super::{AgentContextStore, SessionStore, ToolManifestStore};
use crate::context::{AgentContext, AgentSession};
use crate::errors::PipelineError;
use crate::tools::ToolCallManifest;
use crate::utils::iso_timestamp;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

fn key(org_id: &str, id: &str) -> String {
    format!("{org_id}/{id}")
}

/// Sessions held in a `DashMap`, with write counters.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, AgentSession>,
    inserts: AtomicUsize,
    updates: AtomicUsize,
}

impl InMemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a session as if it had been inserted, keeping its version
    /// (or 1 when unset). Does not count as a write.
    pub fn seed(&self, mut session: AgentSession) {
        session.version = session.version.max(1);
        self.sessions.insert(key(&session.org.id, &session.id), session);
    }

    /// Number of successful inserts.
    #[must_use]
    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    /// Number of successful updates.
    #[must_use]
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Inserts plus updates.
    #[must_use]
    pub fn persist_count(&self) -> usize {
        self.insert_count() + self.update_count()
    }

    /// Reads a stored session without going through the async trait.
    #[must_use]
    pub fn snapshot(&self, org_id: &str, session_id: &str) -> Option<AgentSession> {
        self.sessions.get(&key(org_id, session_id)).map(|s| s.clone())
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_session(
        &self,
        org_id: &str,
        session_id: &str,
    ) -> Result<Option<AgentSession>, PipelineError> {
        Ok(self.snapshot(org_id, session_id))
    }

    async fn insert_session(&self, session: &AgentSession) -> Result<u64, PipelineError> {
        match self.sessions.entry(key(&session.org.id, &session.id)) {
            Entry::Occupied(existing) => Err(PipelineError::SessionConflict {
                session_id: session.id.clone(),
                expected: 0,
                actual: existing.get().version,
            }),
            Entry::Vacant(slot) => {
                let mut stored = session.clone();
                stored.version = 1;
                stored.last_updated_date = iso_timestamp();
                slot.insert(stored);
                self.inserts.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            }
        }
    }

    async fn update_session(&self, session: &AgentSession) -> Result<u64, PipelineError> {
        let mut stored = self
            .sessions
            .get_mut(&key(&session.org.id, &session.id))
            .ok_or_else(|| PipelineError::not_found("AgentSession", &session.id))?;

        if stored.version != session.version {
            return Err(PipelineError::SessionConflict {
                session_id: session.id.clone(),
                expected: session.version,
                actual: stored.version,
            });
        }

        let version = session.version + 1;
        let mut next = session.clone();
        next.version = version;
        next.last_updated_date = iso_timestamp();
        *stored = next;
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(version)
    }
}

/// Agent contexts with a per-organization default.
#[derive(Debug, Default)]
pub struct InMemoryAgentContextStore {
    contexts: DashMap<String, AgentContext>,
    defaults: DashMap<String, String>,
    saves: AtomicUsize,
}

impl InMemoryAgentContextStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a context; the first one added for an org becomes its default.
    #[must_use]
    pub fn with_context(self, agent_context: AgentContext) -> Self {
        self.defaults
            .entry(agent_context.org_id.clone())
            .or_insert_with(|| agent_context.id.clone());
        self.contexts
            .insert(key(&agent_context.org_id, &agent_context.id), agent_context);
        self
    }

    /// Number of saves made through the trait.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentContextStore for InMemoryAgentContextStore {
    async fn get_agent_context(
        &self,
        org_id: &str,
        agent_context_id: &str,
    ) -> Result<Option<AgentContext>, PipelineError> {
        Ok(self
            .contexts
            .get(&key(org_id, agent_context_id))
            .map(|c| c.clone()))
    }

    async fn default_agent_context(
        &self,
        org_id: &str,
    ) -> Result<Option<AgentContext>, PipelineError> {
        let Some(id) = self.defaults.get(org_id).map(|id| id.clone()) else {
            return Ok(None);
        };
        self.get_agent_context(org_id, &id).await
    }

    async fn save_agent_context(&self, agent_context: &AgentContext) -> Result<(), PipelineError> {
        self.contexts.insert(
            key(&agent_context.org_id, &agent_context.id),
            agent_context.clone(),
        );
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Pending manifests, with set and remove counters.
#[derive(Debug, Default)]
pub struct InMemoryToolManifestStore {
    manifests: DashMap<String, ToolCallManifest>,
    sets: AtomicUsize,
    removes: AtomicUsize,
}

impl InMemoryToolManifestStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a manifest without counting a write.
    pub fn seed(&self, manifest_id: &str, org_id: &str, manifest: ToolCallManifest) {
        self.manifests.insert(key(org_id, manifest_id), manifest);
    }

    /// Returns true if a manifest is stored under the key.
    #[must_use]
    pub fn contains(&self, manifest_id: &str, org_id: &str) -> bool {
        self.manifests.contains_key(&key(org_id, manifest_id))
    }

    /// Reads a stored manifest.
    #[must_use]
    pub fn snapshot(&self, manifest_id: &str, org_id: &str) -> Option<ToolCallManifest> {
        self.manifests
            .get(&key(org_id, manifest_id))
            .map(|m| m.clone())
    }

    /// Number of `set_manifest` calls.
    #[must_use]
    pub fn set_count(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    /// Number of `remove_manifest` calls.
    #[must_use]
    pub fn remove_count(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolManifestStore for InMemoryToolManifestStore {
    async fn get_manifest(
        &self,
        manifest_id: &str,
        org_id: &str,
    ) -> Result<Option<ToolCallManifest>, PipelineError> {
        Ok(self.snapshot(manifest_id, org_id))
    }

    async fn set_manifest(
        &self,
        manifest_id: &str,
        org_id: &str,
        manifest: &ToolCallManifest,
    ) -> Result<(), PipelineError> {
        self.manifests
            .insert(key(org_id, manifest_id), manifest.clone());
        self.sets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove_manifest(&self, manifest_id: &str, org_id: &str) -> Result<(), PipelineError> {
        self.manifests.remove(&key(org_id, manifest_id));
        self.removes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EntityRef;
    use crate::errors::codes;
    use crate::tools::ToolCall;
    use serde_json::json;

    fn session() -> AgentSession {
        AgentSession::new(EntityRef::new("org-1", "Acme"), EntityRef::new("u-1", "Ada"))
    }

    #[tokio::test]
    async fn test_insert_sets_version_one() {
        let store = InMemorySessionStore::new();
        let session = session();

        assert_eq!(store.insert_session(&session).await.unwrap(), 1);
        let loaded = store.get_session("org-1", &session.id).await.unwrap().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(store.insert_count(), 1);
    }

    #[tokio::test]
    async fn test_update_bumps_version() {
        let store = InMemorySessionStore::new();
        let session = session();
        store.insert_session(&session).await.unwrap();

        let mut loaded = store.get_session("org-1", &session.id).await.unwrap().unwrap();
        loaded.mode = "general".into();

        assert_eq!(store.update_session(&loaded).await.unwrap(), 2);
        assert_eq!(store.update_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let store = InMemorySessionStore::new();
        let session = session();
        store.insert_session(&session).await.unwrap();

        let first = store.get_session("org-1", &session.id).await.unwrap().unwrap();
        let second = first.clone();
        store.update_session(&first).await.unwrap();

        let err = store.update_session(&second).await.unwrap_err();
        assert_eq!(err.code(), codes::SESSION_CONFLICT);
        assert!(matches!(
            err,
            PipelineError::SessionConflict {
                expected: 1,
                actual: 2,
                ..
            }
        ));
        assert_eq!(store.update_count(), 1);
    }

    #[tokio::test]
    async fn test_sessions_are_scoped_to_org() {
        let store = InMemorySessionStore::new();
        let session = session();
        store.insert_session(&session).await.unwrap();

        assert!(store.get_session("org-2", &session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_first_context_is_default() {
        let store = InMemoryAgentContextStore::new()
            .with_context(AgentContext::new("a-1", "org-1", "First"))
            .with_context(AgentContext::new("a-2", "org-1", "Second"));

        let default = store.default_agent_context("org-1").await.unwrap().unwrap();
        assert_eq!(default.id, "a-1");
        assert!(store.default_agent_context("org-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_manifest_set_and_remove_counted() {
        let store = InMemoryToolManifestStore::new();
        let mut manifest = ToolCallManifest::new();
        manifest.begin_batch(vec![ToolCall::new("c-1", "pick", json!({}))]);

        store.set_manifest("s.t", "org-1", &manifest).await.unwrap();
        assert!(store.contains("s.t", "org-1"));
        assert!(!store.contains("s.t", "org-2"));

        store.remove_manifest("s.t", "org-1").await.unwrap();
        assert!(!store.contains("s.t", "org-1"));
        assert_eq!(store.set_count(), 1);
        assert_eq!(store.remove_count(), 1);
    }
}
