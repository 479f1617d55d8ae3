//! Context contract validation.
//!
//! [`ContextValidator`] is pure: it reads an [`AgentPipelineContext`] and
//! returns a [`ValidationReport`] holding every violation found in one
//! pass. It has three responsibilities:
//!
//! - core invariants and type-based envelope rules
//! - per-step entry and exit rules, looked up by [`PipelineStepKind`]
//! - tool call manifest integrity
//!
//! [`AgentPipelineContext`]: crate::context::AgentPipelineContext
//! [`PipelineStepKind`]: crate::pipeline::PipelineStepKind

mod manifest;
mod report;
mod rules;
mod validator;

pub use report::ValidationReport;
pub use validator::{codes, ContextValidator};
