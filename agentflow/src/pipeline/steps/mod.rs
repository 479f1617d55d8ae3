//! The concrete pipeline steps.
//!
//! - session creation and restoration
//! - agent context resolution and loading
//! - client tool result reconciliation
//! - ACP command routing
//! - prompt knowledge initialization
//! - the reasoner and its model step

mod acp_handler;
mod agent_context;
mod continuation;
mod knowledge;
mod reasoner;
mod session;

pub use acp_handler::AcpCommandHandler;
pub use agent_context::{AgentContextLoader, AgentContextResolver};
pub use continuation::{codes as continuation_codes, reconcile_client_results, ClientToolContinuationResolver};
pub use knowledge::{PromptKnowledgeProviderInitializer, KFR_REGISTER};
pub use reasoner::{LlmClient, LlmClientStep, Reasoner, TOOL_LOOP_REGISTER};
pub use session::{AgentSessionCreator, ClientToolCallSessionRestorer, SessionRestorer};
