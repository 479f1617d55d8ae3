use crate::tools::ToolCallManifest;
use serde::{Deserialize, Serialize};

/// How long register content lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextClassification {
    /// Sent once, then dropped.
    Consumable,
    /// Kept for the whole session.
    Session,
}

/// A named bucket of prompt content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeRegister {
    /// Register name.
    pub name: String,
    /// Lifetime class.
    pub classification: ContextClassification,
    /// Content blocks in insertion order.
    pub items: Vec<String>,
}

impl KnowledgeRegister {
    /// Appends a content block.
    pub fn add(&mut self, item: impl Into<String>) {
        self.items.push(item.into());
    }

    /// Returns the blocks joined by newlines.
    #[must_use]
    pub fn content(&self) -> String {
        self.items.join("\n")
    }
}

/// Per-turn composition of prompt knowledge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptKnowledgeProvider {
    registers: Vec<KnowledgeRegister>,
    /// Tool names offered to the model this turn.
    pub active_tools: Vec<String>,
    /// The turn's tool calls and results.
    pub tool_call_manifest: ToolCallManifest,
    populated: bool,
}

impl PromptKnowledgeProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the register `(name, classification)`, creating it if needed.
    pub fn get_or_create_register(
        &mut self,
        name: &str,
        classification: ContextClassification,
    ) -> &mut KnowledgeRegister {
        let index = match self
            .registers
            .iter()
            .position(|r| r.name == name && r.classification == classification)
        {
            Some(index) => index,
            None => {
                self.registers.push(KnowledgeRegister {
                    name: name.to_string(),
                    classification,
                    items: Vec::new(),
                });
                self.registers.len() - 1
            }
        };
        &mut self.registers[index]
    }

    /// Finds a register by name, in any classification.
    #[must_use]
    pub fn register(&self, name: &str) -> Option<&KnowledgeRegister> {
        self.registers.iter().find(|r| r.name == name)
    }

    /// All registers in creation order.
    #[must_use]
    pub fn registers(&self) -> &[KnowledgeRegister] {
        &self.registers
    }

    /// Drops session-classified registers.
    pub fn clear_session(&mut self) {
        self.registers
            .retain(|r| r.classification != ContextClassification::Session);
    }

    /// Drops consumable registers.
    pub fn clear_consumables(&mut self) {
        self.registers
            .retain(|r| r.classification != ContextClassification::Consumable);
    }

    /// Marks the provider as built for this turn.
    pub fn mark_populated(&mut self) {
        self.populated = true;
    }

    /// Returns true once the provider has been built for this turn.
    #[must_use]
    pub fn is_populated(&self) -> bool {
        self.populated
    }
}
