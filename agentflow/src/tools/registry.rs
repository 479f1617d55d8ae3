//! Tool registry for agent tools.

use super::AgentToolExecutionContext;
use async_trait::async_trait;
use parking_lot::RwLock;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use thiserror::Error;

static TOOL_NAME: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap()
});

/// Failure raised by a tool implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    /// The arguments did not match the tool's schema.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    /// The tool ran and failed.
    #[error("{0}")]
    Failed(String),
}

/// Registration failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolRegistrationError {
    /// Names must match `^[A-Za-z0-9_-]{1,64}$`.
    #[error("invalid tool name '{0}'")]
    InvalidName(String),
    /// A tool with the same name already exists.
    #[error("tool '{0}' is already registered")]
    Duplicate(String),
}

/// A tool the model can call.
#[async_trait]
pub trait AgentTool: Send + Sync {
    /// Unique tool name.
    fn name(&self) -> &str;

    /// Short description offered to the model.
    fn description(&self) -> &str {
        ""
    }

    /// JSON schema of the arguments.
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    /// False for tools whose side effect must run on the caller's side.
    fn is_fully_server(&self) -> bool {
        true
    }

    /// Runs the tool and returns its result as JSON text.
    async fn execute(
        &self,
        arguments: &serde_json::Value,
        ctx: &AgentToolExecutionContext,
    ) -> Result<String, ToolError>;
}

/// Registry of agent tools keyed by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn AgentTool>>>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool.
    pub fn register(&self, tool: Arc<dyn AgentTool>) -> Result<(), ToolRegistrationError> {
        let name = tool.name().to_string();
        if !TOOL_NAME.is_match(&name) {
            return Err(ToolRegistrationError::InvalidName(name));
        }
        let mut tools = self.tools.write();
        if tools.contains_key(&name) {
            return Err(ToolRegistrationError::Duplicate(name));
        }
        tools.insert(name, tool);
        Ok(())
    }

    /// Registers a tool and returns the registry.
    pub fn with_tool(self, tool: Arc<dyn AgentTool>) -> Result<Self, ToolRegistrationError> {
        self.register(tool)?;
        Ok(self)
    }

    /// Looks up a tool.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn AgentTool>> {
        self.tools.read().get(name).cloned()
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl AgentTool for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn execute(
            &self,
            _arguments: &serde_json::Value,
            _ctx: &AgentToolExecutionContext,
        ) -> Result<String, ToolError> {
            Ok("{}".to_string())
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(Named("search"))).unwrap();
        registry.register(Arc::new(Named("calc"))).unwrap();

        assert!(registry.contains("search"));
        assert!(registry.get("calc").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.names(), vec!["calc".to_string(), "search".to_string()]);
    }

    #[test]
    fn test_rejects_duplicates_and_bad_names() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(Named("search"))).unwrap();

        assert_eq!(
            registry.register(Arc::new(Named("search"))),
            Err(ToolRegistrationError::Duplicate("search".into()))
        );
        assert_eq!(
            registry.register(Arc::new(Named("bad name"))),
            Err(ToolRegistrationError::InvalidName("bad name".into()))
        );
        assert_eq!(registry.len(), 1);
    }
}
