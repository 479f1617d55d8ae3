//! Progress sink trait and implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, Level};

/// A narration event published while a request runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Free-form workflow narration.
    Workflow {
        /// The message shown to the user.
        message: String,
    },
    /// A new session was created.
    SessionStarted {
        /// The session id.
        session_id: String,
    },
    /// A new turn was created.
    TurnCreated {
        /// The session id.
        session_id: String,
        /// The turn id.
        turn_id: String,
    },
    /// A server tool is about to run.
    ToolStarted {
        /// The tool name.
        tool: String,
        /// The tool call id.
        tool_call_id: String,
    },
    /// A server tool finished.
    ToolCompleted {
        /// The tool name.
        tool: String,
        /// The tool call id.
        tool_call_id: String,
        /// Wall time in milliseconds.
        elapsed_ms: u64,
    },
    /// A server tool failed.
    ToolFailed {
        /// The tool name.
        tool: String,
        /// The tool call id.
        tool_call_id: String,
        /// The failure reason.
        error: String,
        /// Wall time in milliseconds.
        elapsed_ms: u64,
    },
    /// A model call is starting.
    LlmStarted {
        /// Reasoning iteration, 1-based.
        iteration: usize,
    },
    /// A model call finished.
    LlmCompleted {
        /// Reasoning iteration, 1-based.
        iteration: usize,
        /// Wall time in milliseconds.
        elapsed_ms: u64,
    },
    /// A model call failed.
    LlmFailed {
        /// Reasoning iteration, 1-based.
        iteration: usize,
        /// The failure reason.
        error: String,
    },
    /// A streamed text delta arrived.
    LlmDelta {
        /// The partial text.
        text: String,
    },
}

impl ProgressEvent {
    /// Creates a workflow narration event.
    #[must_use]
    pub fn workflow(message: impl Into<String>) -> Self {
        Self::Workflow {
            message: message.into(),
        }
    }

    /// Returns the dotted event type, e.g. `tool.started`.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Workflow { .. } => "workflow.message",
            Self::SessionStarted { .. } => "session.started",
            Self::TurnCreated { .. } => "turn.created",
            Self::ToolStarted { .. } => "tool.started",
            Self::ToolCompleted { .. } => "tool.completed",
            Self::ToolFailed { .. } => "tool.failed",
            Self::LlmStarted { .. } => "llm.started",
            Self::LlmCompleted { .. } => "llm.completed",
            Self::LlmFailed { .. } => "llm.failed",
            Self::LlmDelta { .. } => "llm.delta",
        }
    }
}

/// Receives progress narration.
///
/// Implementations must not block for long and must never fail; errors
/// are logged and suppressed.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Publishes an event asynchronously.
    async fn publish(&self, event: ProgressEvent);

    /// Publishes an event without awaiting.
    fn try_publish(&self, event: ProgressEvent);
}

/// A sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProgressSink;

#[async_trait]
impl ProgressSink for NoOpProgressSink {
    async fn publish(&self, _event: ProgressEvent) {}

    fn try_publish(&self, _event: ProgressEvent) {}
}

/// A sink that mirrors events into `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingProgressSink {
    level: Level,
}

impl Default for LoggingProgressSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingProgressSink {
    /// Creates a sink logging at the given level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event: &ProgressEvent) {
        let event_type = event.event_type();
        if self.level == Level::DEBUG {
            debug!(event_type = %event_type, event = ?event, "progress: {}", event_type);
        } else {
            info!(event_type = %event_type, event = ?event, "progress: {}", event_type);
        }
    }
}

#[async_trait]
impl ProgressSink for LoggingProgressSink {
    async fn publish(&self, event: ProgressEvent) {
        self.log_event(&event);
    }

    fn try_publish(&self, event: ProgressEvent) {
        self.log_event(&event);
    }
}

/// A sink that records every event, for tests.
#[derive(Debug, Default)]
pub struct CollectingProgressSink {
    events: parking_lot::RwLock<Vec<ProgressEvent>>,
}

impl CollectingProgressSink {
    /// Creates an empty collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events in order.
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Returns events whose type starts with `prefix`.
    #[must_use]
    pub fn events_of_type(&self, prefix: &str) -> Vec<ProgressEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type().starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Returns the workflow messages in order.
    #[must_use]
    pub fn workflow_messages(&self) -> Vec<String> {
        self.events
            .read()
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Workflow { message } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ProgressSink for CollectingProgressSink {
    async fn publish(&self, event: ProgressEvent) {
        self.events.write().push(event);
    }

    fn try_publish(&self, event: ProgressEvent) {
        self.events.write().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_and_logging_sinks_do_not_panic() {
        NoOpProgressSink.publish(ProgressEvent::workflow("hi")).await;
        let sink = LoggingProgressSink::debug();
        sink.publish(ProgressEvent::LlmStarted { iteration: 1 }).await;
        sink.try_publish(ProgressEvent::LlmDelta { text: "x".into() });
    }

    #[tokio::test]
    async fn test_collecting_sink_filters_by_prefix() {
        let sink = CollectingProgressSink::new();
        sink.publish(ProgressEvent::ToolStarted {
            tool: "calc".into(),
            tool_call_id: "c1".into(),
        })
        .await;
        sink.try_publish(ProgressEvent::ToolCompleted {
            tool: "calc".into(),
            tool_call_id: "c1".into(),
            elapsed_ms: 3,
        });
        sink.try_publish(ProgressEvent::workflow("working"));

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.events_of_type("tool.").len(), 2);
        assert_eq!(sink.workflow_messages(), vec!["working".to_string()]);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(ProgressEvent::LlmDelta { text: "a".into() }).unwrap();
        assert_eq!(json["type"], "llm_delta");
        assert_eq!(json["text"], "a");
    }
}
