//! Persisted session state.

use super::EntityRef;
use crate::utils::{generate_id, iso_timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle of a single turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    /// Created, nothing ran yet.
    #[default]
    New,
    /// Work in progress.
    Pending,
    /// Suspended until the client posts tool results.
    PendingClientTools,
    /// A final answer was produced.
    Completed,
    /// Cancelled.
    Aborted,
    /// Failed.
    Failed,
}

/// Kind of a Known Facts Registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KfrKind {
    /// The single current goal.
    Goal,
    /// The single current plan.
    Plan,
    /// A contract the agent must honor.
    ActiveContract,
    /// A constraint on the work.
    Constraint,
    /// A question awaiting resolution.
    OpenQuestion,
}

/// One Known Facts Registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KfrEntry {
    /// Entry id.
    pub kfr_id: String,
    /// Entry kind.
    pub kind: KfrKind,
    /// Entry text.
    pub value: String,
    /// Marks an open question as blocking.
    #[serde(default)]
    pub requires_resolution: bool,
    /// Inactive entries are kept but not rendered.
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Creation timestamp.
    #[serde(default)]
    pub creation_date: String,
}

fn default_true() -> bool {
    true
}

impl KfrEntry {
    /// Creates an active entry.
    #[must_use]
    pub fn new(kind: KfrKind, value: impl Into<String>) -> Self {
        Self {
            kfr_id: generate_id(),
            kind,
            value: value.into(),
            requires_resolution: kind == KfrKind::OpenQuestion,
            is_active: true,
            tags: Vec::new(),
            creation_date: iso_timestamp(),
        }
    }

    /// Marks the entry inactive.
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// One request/response exchange within a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSessionTurn {
    /// Turn id.
    pub id: String,
    /// 1-based position within the session.
    pub sequence_number: u32,
    /// Owning session.
    pub session_id: String,
    /// Creator.
    pub created_by_user: EntityRef,
    /// Creation timestamp.
    pub creation_date: String,
    /// Mode active when the turn ran.
    pub mode: String,
    /// Lifecycle status.
    pub status: TurnStatus,
    /// When the status last changed.
    pub status_timestamp: String,
    /// Truncated instruction text.
    pub instruction_summary: String,
    /// Whether the instruction summary was truncated.
    pub instructions_truncated: bool,
    /// Truncated final answer.
    pub agent_answer_summary: String,
    /// Whether the answer summary was truncated.
    pub agent_answer_truncated: bool,
    /// Provider response id for chaining.
    pub response_id: Option<String>,
    /// Wall time of the whole request.
    pub execution_ms: u64,
    /// Prompt tokens.
    pub prompt_tokens: u64,
    /// Completion tokens.
    pub completion_tokens: u64,
    /// Total tokens.
    pub total_tokens: u64,
    /// Reasoning tokens.
    pub reasoning_tokens: u64,
    /// Cached prompt tokens.
    pub cached_tokens: u64,
    /// Warnings surfaced to the caller.
    pub warnings: Vec<String>,
    /// Errors recorded on the turn.
    pub errors: Vec<String>,
}

impl AgentSessionTurn {
    /// Creates a new turn in `session_id` at `sequence_number`.
    #[must_use]
    pub fn new(session_id: impl Into<String>, sequence_number: u32, user: EntityRef) -> Self {
        let now = iso_timestamp();
        Self {
            id: generate_id(),
            sequence_number,
            session_id: session_id.into(),
            created_by_user: user,
            creation_date: now.clone(),
            status: TurnStatus::New,
            status_timestamp: now,
            ..Self::default()
        }
    }

    /// Updates the status and its timestamp.
    pub fn set_status(&mut self, status: TurnStatus) {
        self.status = status;
        self.status_timestamp = iso_timestamp();
    }
}

/// Persisted conversation state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSession {
    /// Session id.
    pub id: String,
    /// Owning organization.
    pub org: EntityRef,
    /// Creating user.
    pub created_by_user: EntityRef,
    /// Agent context the session runs under.
    pub agent_context_id: String,
    /// Role within the agent context.
    pub conversation_context_id: String,
    /// Current mode key.
    pub mode: String,
    /// Active KFR branch.
    pub current_branch: String,
    /// KFR entries per branch.
    pub kfrs: HashMap<String, Vec<KfrEntry>>,
    /// Turns in order.
    pub turns: Vec<AgentSessionTurn>,
    /// Tokens consumed across all turns.
    pub total_token_count: u64,
    /// Optimistic concurrency version; 0 means never persisted.
    pub version: u64,
    /// Creation timestamp.
    pub creation_date: String,
    /// Last persisted timestamp.
    pub last_updated_date: String,
}

impl AgentSession {
    /// Creates an unpersisted session.
    #[must_use]
    pub fn new(org: EntityRef, user: EntityRef) -> Self {
        let now = iso_timestamp();
        Self {
            id: generate_id(),
            org,
            created_by_user: user,
            creation_date: now.clone(),
            last_updated_date: now,
            ..Self::default()
        }
    }

    /// Finds a turn by id.
    #[must_use]
    pub fn find_turn(&self, turn_id: &str) -> Option<&AgentSessionTurn> {
        self.turns.iter().find(|t| t.id == turn_id)
    }

    /// Finds a turn by id, mutably.
    pub fn find_turn_mut(&mut self, turn_id: &str) -> Option<&mut AgentSessionTurn> {
        self.turns.iter_mut().find(|t| t.id == turn_id)
    }

    /// Returns the sequence number the next turn should take.
    #[must_use]
    pub fn next_sequence_number(&self) -> u32 {
        self.turns.iter().map(|t| t.sequence_number).max().unwrap_or(0) + 1
    }

    /// Returns the active branch, or `default_branch` when unset.
    #[must_use]
    pub fn branch_or<'a>(&'a self, default_branch: &'a str) -> &'a str {
        if self.current_branch.trim().is_empty() {
            default_branch
        } else {
            &self.current_branch
        }
    }

    /// Adds a KFR entry to `branch`.
    pub fn add_kfr(&mut self, branch: impl Into<String>, entry: KfrEntry) {
        self.kfrs.entry(branch.into()).or_default().push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_sequence_number() {
        let mut session = AgentSession::new(EntityRef::new("o", ""), EntityRef::new("u", ""));
        assert_eq!(session.next_sequence_number(), 1);

        let id = session.id.clone();
        session.turns.push(AgentSessionTurn::new(&id, 1, EntityRef::default()));
        session.turns.push(AgentSessionTurn::new(&id, 2, EntityRef::default()));
        assert_eq!(session.next_sequence_number(), 3);
    }

    #[test]
    fn test_branch_falls_back_to_default() {
        let mut session = AgentSession::default();
        assert_eq!(session.branch_or("main"), "main");
        session.current_branch = "feature".into();
        assert_eq!(session.branch_or("main"), "feature");
    }

    #[test]
    fn test_open_questions_require_resolution() {
        assert!(KfrEntry::new(KfrKind::OpenQuestion, "why?").requires_resolution);
        assert!(!KfrEntry::new(KfrKind::Goal, "ship").requires_resolution);
    }

    #[test]
    fn test_set_status_updates_timestamp() {
        let mut turn = AgentSessionTurn::new("s", 1, EntityRef::default());
        turn.status_timestamp.clear();
        turn.set_status(TurnStatus::Completed);
        assert_eq!(turn.status, TurnStatus::Completed);
        assert!(!turn.status_timestamp.is_empty());
    }
}
