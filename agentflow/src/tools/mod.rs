//! Tool calling.
//!
//! This module provides:
//! - [`ToolCall`] / [`ToolCallResult`] / [`ToolCallManifest`], the per-turn record
//! - [`AgentTool`] and the [`ToolRegistry`]
//! - [`ToolExecutor`] and the registry-backed [`AgentToolExecutor`]
//! - [`ToolLoopGuard`] for repeated identical calls

mod executor;
mod loop_guard;
mod manifest;
mod registry;

pub use executor::{AgentToolExecutionContext, AgentToolExecutor, ToolExecution, ToolExecutor};
pub use loop_guard::{LoopGuardDecision, ToolLoopGuard};
pub(crate) use manifest::has_text;
pub use manifest::{ToolCall, ToolCallManifest, ToolCallResult};
pub use registry::{AgentTool, ToolError, ToolRegistrationError, ToolRegistry};
