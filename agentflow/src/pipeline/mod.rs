//! Step chains and request handling.
//!
//! This module provides:
//! - [`PipelineStep`] and [`run_step`], the contract-checking step runner
//! - [`PipelineChain`]: the fixed step order for each request kind
//! - Every concrete step, including the bounded [`Reasoner`] loop
//! - [`AgentExecuteResponseBuilder`] and the top-level [`AgentRequestHandler`]

mod chain;
mod ports;
mod request_handler;
mod response_builder;
mod step;
mod steps;


pub use chain::{chain_kinds, PipelineChain};
pub use ports::PipelinePorts;
pub use request_handler::AgentRequestHandler;
pub use response_builder::{
    AgentExecuteResponse, AgentExecuteResponseBuilder, ClientToolCall, ResponseKind,
};
pub use step::{run_step, PipelineStep, PipelineStepKind, StepResult, StepStatus};
pub use steps::{
    continuation_codes, reconcile_client_results, AcpCommandHandler, AgentContextLoader,
    AgentContextResolver, AgentSessionCreator, ClientToolCallSessionRestorer,
    ClientToolContinuationResolver, LlmClient, LlmClientStep, PromptKnowledgeProviderInitializer,
    Reasoner, SessionRestorer, KFR_REGISTER, TOOL_LOOP_REGISTER,
};
