//! Pure SSE framing and payload analysis.

use crate::errors::{codes, PipelineError};
use serde_json::Value;

const COMPLETED: &str = "response.completed";
const DELTA_SUFFIX: &str = "output_text.delta";
const DONE: &str = "[DONE]";

/// One framed event: the optional `event:` name and its joined `data:` lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Name from the `event:` line.
    pub name: Option<String>,
    /// Data lines joined with `\n`.
    pub data: String,
}

/// What a single pushed line produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    /// Nothing complete yet.
    Pending,
    /// A blank line closed an event.
    Event(SseEvent),
    /// `data: [DONE]`; carries any event still buffered.
    Done(Option<SseEvent>),
}

/// Accumulates lines into events.
#[derive(Debug, Default)]
pub struct SseEventParser {
    name: Option<String>,
    data: Vec<String>,
}

impl SseEventParser {
    /// Creates an empty parser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one line, without its terminator.
    pub fn push_line(&mut self, line: &str) -> SseLine {
        let line = line.trim_end_matches(['\r', '\n']);

        if line.trim().is_empty() {
            return self.take().map_or(SseLine::Pending, SseLine::Event);
        }

        if let Some(rest) = strip_field(line, "event:") {
            self.name = Some(rest.trim().to_string());
        } else if let Some(rest) = strip_field(line, "data:") {
            let data = rest.trim();
            if data == DONE {
                return SseLine::Done(self.take());
            }
            self.data.push(data.to_string());
        }
        SseLine::Pending
    }

    /// Flushes an event left open at end of stream.
    pub fn finish(&mut self) -> Option<SseEvent> {
        self.take()
    }

    fn take(&mut self) -> Option<SseEvent> {
        let name = self.name.take();
        if self.data.is_empty() {
            return None;
        }
        Some(SseEvent {
            name,
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}

fn strip_field<'a>(line: &'a str, field: &str) -> Option<&'a str> {
    let head = line.get(..field.len())?;
    head.eq_ignore_ascii_case(field).then(|| &line[field.len()..])
}

/// Interpretation of one event payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyzedEvent {
    /// The JSON `type`, falling back to the SSE event name.
    pub event_type: String,
    /// Text carried by an output text delta.
    pub delta_text: Option<String>,
    /// Response id carried by a completed event.
    pub response_id: Option<String>,
}

impl AnalyzedEvent {
    /// Returns true for a `response.completed` event.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.event_type.eq_ignore_ascii_case(COMPLETED)
    }
}

/// Parses an event payload and pulls out its delta text or response id.
///
/// Malformed JSON yields the event name and nothing else.
#[must_use]
pub fn analyze_event(event_name: Option<&str>, data: &str) -> AnalyzedEvent {
    let fallback = || AnalyzedEvent {
        event_type: event_name.unwrap_or_default().to_string(),
        ..AnalyzedEvent::default()
    };

    if data.trim().is_empty() {
        return fallback();
    }
    let Ok(root) = serde_json::from_str::<Value>(data) else {
        return fallback();
    };

    let event_type = root
        .get("type")
        .and_then(Value::as_str)
        .or(event_name)
        .unwrap_or_default()
        .to_string();

    let mut analyzed = AnalyzedEvent {
        event_type,
        ..AnalyzedEvent::default()
    };

    if ends_with_ignore_case(&analyzed.event_type, DELTA_SUFFIX) {
        analyzed.delta_text = delta_text(root.get("delta"))
            .or_else(|| delta_text(root.get("output_text").and_then(|o| o.get("delta"))))
            .filter(|t| !t.is_empty());
    } else if analyzed.is_completed() {
        analyzed.response_id = root
            .get("response")
            .and_then(|r| r.get("id"))
            .and_then(Value::as_str)
            .filter(|id| !id.trim().is_empty())
            .map(String::from);
    }
    analyzed
}

fn delta_text(token: Option<&Value>) -> Option<String> {
    match token? {
        Value::String(text) => Some(text.clone()),
        other => other.get("text").and_then(Value::as_str).map(String::from),
    }
}

fn ends_with_ignore_case(value: &str, suffix: &str) -> bool {
    value.len() >= suffix.len()
        && value
            .get(value.len() - suffix.len()..)
            .is_some_and(|tail| tail.eq_ignore_ascii_case(suffix))
}

/// Returns the compact inner `response` object of a completed event, or
/// the whole payload when it has none.
pub fn extract_completed_response(data: &str) -> Result<String, PipelineError> {
    if data.trim().is_empty() {
        return Err(PipelineError::stream(
            codes::STREAM_EMPTY_COMPLETED,
            "The completed event JSON payload is empty.",
        ));
    }
    let root: Value = serde_json::from_str(data).map_err(|e| {
        PipelineError::stream(
            codes::STREAM_READ_FAILED,
            format!("Failed to parse completed event JSON: {e}"),
        )
    })?;
    match root.get("response") {
        Some(inner @ Value::Object(_)) => Ok(inner.to_string()),
        _ => Ok(data.trim().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_blank_line_closes_event() {
        let mut parser = SseEventParser::new();
        assert_eq!(parser.push_line("event: response.completed"), SseLine::Pending);
        assert_eq!(parser.push_line("data: {\"a\":1}"), SseLine::Pending);

        assert_eq!(
            parser.push_line(""),
            SseLine::Event(SseEvent {
                name: Some("response.completed".into()),
                data: "{\"a\":1}".into(),
            })
        );
        assert_eq!(parser.finish(), None);
    }

    #[test]
    fn test_multiple_data_lines_are_joined() {
        let mut parser = SseEventParser::new();
        parser.push_line("data: {\"a\":");
        parser.push_line("data: 1}");

        let event = parser.finish().unwrap();
        assert_eq!(event.data, "{\"a\":\n1}");
        assert!(event.name.is_none());
    }

    #[test]
    fn test_done_flushes_buffered_event() {
        let mut parser = SseEventParser::new();
        parser.push_line("event: response.completed");
        parser.push_line("data: {}");

        match parser.push_line("data: [DONE]") {
            SseLine::Done(Some(event)) => assert_eq!(event.data, "{}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_blank_line_without_data_is_ignored() {
        let mut parser = SseEventParser::new();
        parser.push_line("event: ping");
        assert_eq!(parser.push_line("   "), SseLine::Pending);
        assert_eq!(parser.finish(), None);
    }

    #[test]
    fn test_delta_shapes() {
        let shapes = [
            r#"{"type":"response.output_text.delta","delta":"Hi"}"#,
            r#"{"type":"response.output_text.delta","delta":{"text":"Hi"}}"#,
            r#"{"type":"response.output_text.delta","output_text":{"delta":"Hi"}}"#,
            r#"{"type":"response.output_text.delta","output_text":{"delta":{"text":"Hi"}}}"#,
        ];
        for shape in shapes {
            let analyzed = analyze_event(None, shape);
            assert_eq!(analyzed.delta_text.as_deref(), Some("Hi"), "{shape}");
        }
    }

    #[test]
    fn test_completed_extracts_response_id() {
        let analyzed = analyze_event(
            Some("response.completed"),
            r#"{"type":"response.completed","response":{"id":"resp_123","output":[]}}"#,
        );
        assert!(analyzed.is_completed());
        assert_eq!(analyzed.response_id.as_deref(), Some("resp_123"));
        assert!(analyzed.delta_text.is_none());
    }

    #[test]
    fn test_malformed_json_falls_back_to_event_name() {
        let analyzed = analyze_event(Some("response.output_text.delta"), "{ not json");
        assert_eq!(analyzed.event_type, "response.output_text.delta");
        assert!(analyzed.delta_text.is_none());
        assert!(analyzed.response_id.is_none());
    }

    #[test]
    fn test_extract_inner_response() {
        let inner = extract_completed_response(
            r#"{"type":"response.completed","response":{"id":"resp_999","foo":"bar"}}"#,
        )
        .unwrap();
        let inner: Value = serde_json::from_str(&inner).unwrap();
        assert_eq!(inner, serde_json::json!({"id": "resp_999", "foo": "bar"}));
    }

    #[test]
    fn test_extract_without_inner_returns_root() {
        let json = r#"{"type":"response.completed","other":"value"}"#;
        assert_eq!(extract_completed_response(json).unwrap(), json);
    }
}
