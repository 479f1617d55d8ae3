//! Server-sent event reading for streamed model responses.
//!
//! This module provides:
//! - [`SseEventParser`], a pure line-oriented event framer
//! - [`analyze_event`] and [`extract_completed_response`] for payloads
//! - [`StreamingResponseReader`], which drives the parser over a byte
//!   source, publishes deltas and returns the completed response

mod parser;
mod reader;

pub use parser::{
    analyze_event, extract_completed_response, AnalyzedEvent, SseEvent, SseEventParser, SseLine,
};
pub use reader::{StreamOutcome, StreamingResponseReader};
