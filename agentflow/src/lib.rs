//! # Agentflow
//!
//! A multi-tenant agent execution pipeline.
//!
//! Each request is classified as initial, follow-on or client tool
//! continuation, and runs exactly one fixed chain of validated steps:
//!
//! - **Step contracts**: every step is checked against entry and exit rules
//! - **Session state**: sessions, turns and knowledge registers persisted with
//!   optimistic concurrency
//! - **Bounded reasoning**: a tool loop with repeat detection and client tool
//!   suspension
//! - **Continuations**: client tool results reconciled against the stored
//!   manifest
//! - **Narration**: progress events and streamed model deltas
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use agentflow::prelude::*;
//!
//! let ports = PipelinePorts::new(sessions, agent_contexts, manifests, tools, llm);
//! let handler = AgentRequestHandler::new(ports);
//!
//! let response = handler.handle(request, org, user).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod acp;
pub mod cancellation;
pub mod config;
pub mod context;
pub mod errors;
pub mod events;
pub mod knowledge;
pub mod observability;
pub mod pipeline;
pub mod stores;
pub mod streaming;
pub mod testing;
pub mod tools;
pub mod utils;
pub mod validation;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::acp::{AcpCommand, AcpCommandRegistry, ChangeModeCommand};
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::PipelineConfig;
    pub use crate::context::{
        AgentContext, AgentExecuteRequest, AgentMode, AgentPipelineContext, AgentSession,
        AgentSessionTurn, EntityRef, Envelope, RequestKind, ResponsePayload, ResponseType,
        ToolResultSubmission, TurnStatus,
    };
    pub use crate::errors::{PipelineError, Violation};
    pub use crate::events::{LoggingProgressSink, NoOpProgressSink, ProgressEvent, ProgressSink};
    pub use crate::knowledge::{KnowledgePackSource, PromptKnowledgeProvider};
    pub use crate::pipeline::{
        AgentExecuteResponse, AgentRequestHandler, LlmClient, PipelinePorts, PipelineStep,
        PipelineStepKind, ResponseKind,
    };
    pub use crate::stores::{
        AgentContextStore, InMemoryAgentContextStore, InMemorySessionStore,
        InMemoryToolManifestStore, SessionStore, ToolManifestStore,
    };
    pub use crate::streaming::StreamingResponseReader;
    pub use crate::tools::{
        AgentTool, AgentToolExecutor, ToolCall, ToolCallManifest, ToolExecutor, ToolRegistry,
    };
    pub use crate::validation::{ContextValidator, ValidationReport};
}
