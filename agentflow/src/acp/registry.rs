//! ACP command descriptors and registry.

use crate::context::AgentPipelineContext;
use crate::errors::PipelineError;
use async_trait::async_trait;
use parking_lot::RwLock;
use regex::{Regex, RegexBuilder};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};
use thiserror::Error;
use tracing::debug;

static COMMAND_ID: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^[a-zA-Z0-9_.-]+$").unwrap()
});

/// Tie-break priority when several commands match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AcpPriority {
    /// Lowest.
    Low,
    /// Default.
    #[default]
    Normal,
    /// Preferred.
    High,
    /// Always wins.
    Critical,
}

/// Regex gate on one positional argument.
#[derive(Debug, Clone)]
pub struct AcpArgRule {
    /// Argument position.
    pub index: usize,
    /// Compiled pattern.
    pub pattern: Regex,
}

impl AcpArgRule {
    /// Compiles a rule; `ignore_case` defaults to true in descriptors.
    pub fn new(index: usize, pattern: &str, ignore_case: bool) -> Result<Self, regex::Error> {
        let pattern = RegexBuilder::new(pattern)
            .case_insensitive(ignore_case)
            .build()?;
        Ok(Self { index, pattern })
    }

    /// Returns true if the argument exists and matches.
    #[must_use]
    pub fn matches(&self, args: &[String]) -> bool {
        args.get(self.index)
            .is_some_and(|arg| self.pattern.is_match(arg))
    }
}

/// Static description of a command.
#[derive(Debug, Clone)]
pub struct AcpCommandDescriptor {
    /// Unique id, matched case-insensitively.
    pub command_id: String,
    /// Human-readable name.
    pub display_name: String,
    /// What the command does.
    pub description: String,
    /// Leading phrases that select the command.
    pub triggers: Vec<String>,
    /// Compare triggers ignoring case.
    pub case_insensitive: bool,
    /// Minimum argument count.
    pub min_args: usize,
    /// Maximum argument count.
    pub max_args: usize,
    /// The caller should confirm before running.
    pub requires_confirmation: bool,
    /// The command mutates state outside the turn.
    pub produces_side_effects: bool,
    /// Tie-break priority.
    pub priority: AcpPriority,
    /// Argument gates.
    pub arg_rules: Vec<AcpArgRule>,
}

impl AcpCommandDescriptor {
    /// Creates a descriptor with no triggers and zero arguments.
    #[must_use]
    pub fn new(
        command_id: impl Into<String>,
        display_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            command_id: command_id.into(),
            display_name: display_name.into(),
            description: description.into(),
            triggers: Vec::new(),
            case_insensitive: true,
            min_args: 0,
            max_args: 0,
            requires_confirmation: false,
            produces_side_effects: false,
            priority: AcpPriority::Normal,
            arg_rules: Vec::new(),
        }
    }

    /// Adds a trigger.
    #[must_use]
    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.triggers.push(trigger.into());
        self
    }

    /// Sets argument bounds.
    #[must_use]
    pub fn with_args(mut self, min: usize, max: usize) -> Self {
        self.min_args = min;
        self.max_args = max;
        self
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: AcpPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Makes triggers case-sensitive.
    #[must_use]
    pub fn case_sensitive(mut self) -> Self {
        self.case_insensitive = false;
        self
    }

    /// Adds an argument gate.
    #[must_use]
    pub fn with_arg_rule(mut self, rule: AcpArgRule) -> Self {
        self.arg_rules.push(rule);
        self
    }

    /// Marks the command as side-effecting.
    #[must_use]
    pub fn with_side_effects(mut self, requires_confirmation: bool) -> Self {
        self.produces_side_effects = true;
        self.requires_confirmation = requires_confirmation;
        self
    }
}

/// A command the pipeline can run instead of calling the model.
#[async_trait]
pub trait AcpCommand: Send + Sync {
    /// The command's descriptor.
    fn descriptor(&self) -> AcpCommandDescriptor;

    /// Runs the command. Implementations normally set a response payload.
    async fn execute(
        &self,
        ctx: &mut AgentPipelineContext,
        args: &[String],
    ) -> Result<(), PipelineError>;
}

/// Registration failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AcpRegistrationError {
    /// The id is empty or has characters outside `[a-zA-Z0-9_.-]`.
    #[error("ACP command id '{0}' does not match pattern '^[a-zA-Z0-9_.-]+$'")]
    InvalidCommandId(String),
    /// No non-blank trigger was declared.
    #[error("ACP command '{0}' must declare at least one trigger")]
    MissingTriggers(String),
    /// `max_args < min_args`.
    #[error("ACP command '{command_id}' has max args {max} below min args {min}")]
    InvalidArgBounds {
        /// The command id.
        command_id: String,
        /// Declared minimum.
        min: usize,
        /// Declared maximum.
        max: usize,
    },
    /// Another command already uses the id.
    #[error("Duplicate ACP command id '{0}'")]
    Duplicate(String),
}

struct Registered {
    descriptor: AcpCommandDescriptor,
    command: Arc<dyn AcpCommand>,
}

/// Registered commands keyed by lowercase id.
#[derive(Default)]
pub struct AcpCommandRegistry {
    commands: RwLock<BTreeMap<String, Registered>>,
}

impl AcpCommandRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and registers a command. Triggers are trimmed.
    pub fn register(&self, command: Arc<dyn AcpCommand>) -> Result<(), AcpRegistrationError> {
        let mut descriptor = command.descriptor();
        let id = descriptor.command_id.trim().to_string();
        if !COMMAND_ID.is_match(&id) {
            return Err(AcpRegistrationError::InvalidCommandId(id));
        }

        descriptor.triggers = descriptor
            .triggers
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if descriptor.triggers.is_empty() {
            return Err(AcpRegistrationError::MissingTriggers(id));
        }
        if descriptor.max_args < descriptor.min_args {
            return Err(AcpRegistrationError::InvalidArgBounds {
                command_id: id,
                min: descriptor.min_args,
                max: descriptor.max_args,
            });
        }

        let mut commands = self.commands.write();
        let key = id.to_ascii_lowercase();
        if commands.contains_key(&key) {
            return Err(AcpRegistrationError::Duplicate(id));
        }
        descriptor.command_id = id;
        debug!(command_id = %descriptor.command_id, "Registered ACP command");
        commands.insert(
            key,
            Registered {
                descriptor,
                command,
            },
        );
        Ok(())
    }

    /// Registers a command, builder style.
    pub fn with_command(self, command: Arc<dyn AcpCommand>) -> Result<Self, AcpRegistrationError> {
        self.register(command)?;
        Ok(self)
    }

    /// Returns true if `command_id` is registered.
    #[must_use]
    pub fn contains(&self, command_id: &str) -> bool {
        self.commands
            .read()
            .contains_key(&command_id.to_ascii_lowercase())
    }

    /// Looks up a command.
    #[must_use]
    pub fn get(&self, command_id: &str) -> Option<Arc<dyn AcpCommand>> {
        self.commands
            .read()
            .get(&command_id.to_ascii_lowercase())
            .map(|r| r.command.clone())
    }

    /// Looks up a descriptor.
    #[must_use]
    pub fn descriptor(&self, command_id: &str) -> Option<AcpCommandDescriptor> {
        self.commands
            .read()
            .get(&command_id.to_ascii_lowercase())
            .map(|r| r.descriptor.clone())
    }

    /// All descriptors, ordered by id.
    #[must_use]
    pub fn descriptors(&self) -> Vec<AcpCommandDescriptor> {
        self.commands
            .read()
            .values()
            .map(|r| r.descriptor.clone())
            .collect()
    }

    /// Number of registered commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.read().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.read().is_empty()
    }
}

impl fmt::Debug for AcpCommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcpCommandRegistry")
            .field("commands", &self.commands.read().keys().collect::<Vec<_>>())
            .finish()
    }
}
