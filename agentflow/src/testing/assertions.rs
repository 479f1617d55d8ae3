//! Assertions for pipeline errors and narration.

use crate::errors::PipelineError;
use crate::events::{CollectingProgressSink, ProgressEvent};
use crate::pipeline::{AgentExecuteResponse, ResponseKind};

/// Asserts that `err` carries exactly the violation codes in `expected`, in order.
pub fn assert_violation_codes(err: &PipelineError, expected: &[&str]) {
    let actual: Vec<&str> = err.violations().iter().map(|v| v.code.as_str()).collect();
    assert_eq!(
        actual, expected,
        "Expected violations {:?}, got {:?} from: {}",
        expected, actual, err
    );
}

/// Asserts that some violation message of `err` contains `needle`.
pub fn assert_message_contains(err: &PipelineError, needle: &str) {
    let messages = err.messages();
    assert!(
        messages.iter().any(|m| m.contains(needle)),
        "Expected a message containing '{}', got {:?}",
        needle,
        messages
    );
}

/// Asserts the error code.
pub fn assert_error_code(err: &PipelineError, expected: &str) {
    assert_eq!(
        err.code(),
        expected,
        "Expected error code {}, got {} ({})",
        expected,
        err.code(),
        err
    );
}

/// Asserts the response kind.
pub fn assert_response_kind(response: &AgentExecuteResponse, expected: ResponseKind) {
    assert_eq!(
        response.kind, expected,
        "Expected a {:?} response, got {:?}",
        expected, response.kind
    );
}

/// Asserts that the collected event types, filtered by `prefix`, equal `expected`.
pub fn assert_event_types(sink: &CollectingProgressSink, prefix: &str, expected: &[&str]) {
    let actual: Vec<&'static str> = sink
        .events_of_type(prefix)
        .iter()
        .map(ProgressEvent::event_type)
        .collect();
    assert_eq!(actual, expected, "Unexpected '{}' events", prefix);
}
