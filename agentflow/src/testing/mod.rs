//! Testing utilities for agent pipelines.
//!
//! This module provides:
//! - Fixtures for the standard test tenant, requests and contexts
//! - A scripted model client and fixture tools
//! - [`PipelineHarness`], a handler over in-memory stores
//! - Assertions for errors, responses and narration

mod assertions;
pub mod fixtures;
mod harness;
mod mocks;

pub use assertions::{
    assert_error_code, assert_event_types, assert_message_contains, assert_response_kind,
    assert_violation_codes,
};
pub use harness::PipelineHarness;
pub use mocks::{
    tool_executor, tool_registry, ClientSideTool, EchoTool, FailingTool, ScriptedLlmClient,
    ScriptedTurn,
};
