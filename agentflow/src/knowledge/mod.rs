//! Per-turn prompt knowledge.
//!
//! - [`PromptKnowledgeProvider`]: named content registers rebuilt every turn,
//!   plus the active tool list and the turn's tool call manifest
//! - [`render_kfr_block`]: the Known Facts Registry block injected into the prompt
//! - [`KnowledgePackSource`]: where register content comes from

mod kfr;
mod pack;
mod provider;

pub use kfr::render_kfr_block;
pub use pack::{KnowledgeKindBlock, KnowledgePack, KnowledgePackSource, ModeKnowledgePackSource};
pub use provider::{ContextClassification, KnowledgeRegister, PromptKnowledgeProvider};
