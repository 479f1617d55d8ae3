//! Progress narration for streaming observers.
//!
//! Narration is best-effort: sinks never fail and never affect the
//! outcome of a request. The pipeline publishes:
//!
//! - workflow messages when a chain starts
//! - `tool.*` events around every server tool call
//! - `llm.*` events around every model call, including streamed deltas
//! - `session.started` / `turn.created` domain events

mod sink;

pub use sink::{
    CollectingProgressSink, LoggingProgressSink, NoOpProgressSink, ProgressEvent, ProgressSink,
};
