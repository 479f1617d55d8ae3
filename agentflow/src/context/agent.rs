//! Agent configuration: contexts, roles and modes.

use serde::{Deserialize, Serialize};

/// A role an agent can play, with its model settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationContext {
    /// Role id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Model to call.
    pub model_name: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// System prompts for this role.
    pub system_prompts: Vec<String>,
}

impl ConversationContext {
    /// Creates a role.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            model_name: "gpt-5".to_string(),
            temperature: 0.5,
            system_prompts: Vec::new(),
        }
    }
}

/// A behavioral mode with its own instructions and tools.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentMode {
    /// Mode id.
    pub id: String,
    /// Stable key, e.g. `general`.
    pub key: String,
    /// Display name.
    pub name: String,
    /// What the mode is for.
    pub description: String,
    /// Shown when the mode is entered.
    pub welcome_message: String,
    /// Mode instructions injected into the prompt.
    pub instructions: Vec<String>,
    /// Behavior hints injected into the prompt.
    pub behavior_hints: Vec<String>,
    /// Tool names active in this mode.
    pub active_tools: Vec<String>,
    /// Marks the mode used for new sessions.
    pub is_default: bool,
}

impl AgentMode {
    /// Creates a mode.
    #[must_use]
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            id: crate::utils::generate_id(),
            key,
            name: name.into(),
            ..Self::default()
        }
    }

    /// The built-in catch-all mode.
    #[must_use]
    pub fn general(key: &str) -> Self {
        let mut mode = Self::new(key, "General");
        mode.description = "General purpose assistance.".to_string();
        mode.welcome_message = "How can I help?".to_string();
        mode.is_default = true;
        mode
    }

    /// Adds an active tool.
    #[must_use]
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.active_tools.push(tool.into());
        self
    }

    /// Adds an instruction line.
    #[must_use]
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instructions.push(instruction.into());
        self
    }
}

/// Tenant-level agent configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentContext {
    /// Context id.
    pub id: String,
    /// Owning organization id.
    pub org_id: String,
    /// Display name.
    pub name: String,
    /// Role used when the request names none.
    pub default_conversation_context_id: Option<String>,
    /// Available roles.
    pub conversation_contexts: Vec<ConversationContext>,
    /// Available modes.
    pub agent_modes: Vec<AgentMode>,
    /// Token budget for a prompt.
    pub max_token_count: u32,
}

impl AgentContext {
    /// Creates an agent context.
    #[must_use]
    pub fn new(id: impl Into<String>, org_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            org_id: org_id.into(),
            name: name.into(),
            max_token_count: 256 * 1024,
            ..Self::default()
        }
    }

    /// Adds a role.
    #[must_use]
    pub fn with_role(mut self, role: ConversationContext) -> Self {
        self.conversation_contexts.push(role);
        self
    }

    /// Adds a mode.
    #[must_use]
    pub fn with_mode(mut self, mode: AgentMode) -> Self {
        self.agent_modes.push(mode);
        self
    }

    /// Finds a role by id.
    #[must_use]
    pub fn find_role(&self, id: &str) -> Option<&ConversationContext> {
        self.conversation_contexts.iter().find(|r| r.id == id)
    }

    /// Resolves the role to use: the requested one, else the default, else the first.
    #[must_use]
    pub fn resolve_role(&self, requested: Option<&str>) -> Option<&ConversationContext> {
        match requested {
            Some(id) => self.find_role(id),
            None => self
                .default_conversation_context_id
                .as_deref()
                .and_then(|id| self.find_role(id))
                .or_else(|| self.conversation_contexts.first()),
        }
    }

    /// Finds a mode by key.
    #[must_use]
    pub fn find_mode(&self, key: &str) -> Option<&AgentMode> {
        self.agent_modes.iter().find(|m| m.key == key)
    }

    /// Makes sure a mode keyed `key` exists. Returns true if one was added.
    pub fn ensure_mode(&mut self, key: &str) -> bool {
        if self.find_mode(key).is_some() {
            return false;
        }
        self.agent_modes.push(AgentMode::general(key));
        true
    }
}
