//! Drives [`SseEventParser`] over an async byte source.

use super::parser::{analyze_event, extract_completed_response, SseEvent, SseEventParser, SseLine};
use crate::cancellation::CancellationToken;
use crate::errors::{codes, PipelineError};
use crate::events::{ProgressEvent, ProgressSink};
use futures::{Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, error};

/// Result of reading a stream to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutcome {
    /// Compact JSON of the completed response object.
    pub completed_response: String,
    /// Provider response id, when the completed event carried one.
    pub response_id: Option<String>,
    /// Every delta concatenated in arrival order.
    pub partial_text: String,
}

#[derive(Default)]
struct ReadState {
    parser: SseEventParser,
    completed: Option<String>,
    response_id: Option<String>,
    partial_text: String,
}

/// Reads a streamed model response and returns its completed event.
///
/// Delta text is published as [`ProgressEvent::LlmDelta`] as it arrives.
/// An event left open when the stream ends, or when `[DONE]` arrives, is
/// still dispatched.
#[derive(Clone)]
pub struct StreamingResponseReader {
    progress: Arc<dyn ProgressSink>,
}

impl std::fmt::Debug for StreamingResponseReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingResponseReader").finish_non_exhaustive()
    }
}

impl StreamingResponseReader {
    /// Creates a reader publishing deltas to `progress`.
    #[must_use]
    pub fn new(progress: Arc<dyn ProgressSink>) -> Self {
        Self { progress }
    }

    /// Reads SSE lines from a buffered reader.
    pub async fn read<R>(
        &self,
        reader: R,
        session_id: &str,
        cancellation: &CancellationToken,
    ) -> Result<StreamOutcome, PipelineError>
    where
        R: AsyncBufRead + Unpin + Send,
    {
        require_session(session_id)?;
        let mut lines = reader.lines();
        let mut state = ReadState::default();

        loop {
            if cancellation.is_cancelled() {
                return Err(cancelled());
            }
            let line = tokio::select! {
                biased;
                () = cancellation.cancelled() => return Err(cancelled()),
                line = lines.next_line() => line.map_err(read_failed)?,
            };
            let Some(line) = line else { break };
            if self.push_line(&mut state, &line).await {
                break;
            }
        }

        self.finish(state, session_id).await
    }

    /// Reads SSE lines from a stream of byte chunks.
    ///
    /// Chunk boundaries need not align with lines.
    pub async fn read_chunks<S, E>(
        &self,
        mut chunks: S,
        session_id: &str,
        cancellation: &CancellationToken,
    ) -> Result<StreamOutcome, PipelineError>
    where
        S: Stream<Item = Result<Vec<u8>, E>> + Unpin + Send,
        E: Display,
    {
        require_session(session_id)?;
        let mut state = ReadState::default();
        let mut buffer: Vec<u8> = Vec::new();
        let mut done = false;

        'read: while !done {
            if cancellation.is_cancelled() {
                return Err(cancelled());
            }
            let chunk = tokio::select! {
                biased;
                () = cancellation.cancelled() => return Err(cancelled()),
                chunk = chunks.next() => chunk,
            };
            let Some(chunk) = chunk else { break };
            buffer.extend_from_slice(&chunk.map_err(read_failed)?);

            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = buffer.drain(..=pos).collect();
                if self.push_line(&mut state, &String::from_utf8_lossy(&raw)).await {
                    done = true;
                    continue 'read;
                }
            }
        }

        if !done && !buffer.is_empty() {
            let tail = String::from_utf8_lossy(&buffer).into_owned();
            self.push_line(&mut state, &tail).await;
        }

        self.finish(state, session_id).await
    }

    /// Returns true once `[DONE]` has been seen.
    async fn push_line(&self, state: &mut ReadState, line: &str) -> bool {
        match state.parser.push_line(line) {
            SseLine::Pending => false,
            SseLine::Event(event) => {
                self.dispatch(state, event).await;
                false
            }
            SseLine::Done(event) => {
                if let Some(event) = event {
                    self.dispatch(state, event).await;
                }
                true
            }
        }
    }

    async fn dispatch(&self, state: &mut ReadState, event: SseEvent) {
        let analyzed = analyze_event(event.name.as_deref(), &event.data);

        if let Some(text) = analyzed.delta_text {
            state.partial_text.push_str(&text);
            self.progress.publish(ProgressEvent::LlmDelta { text }).await;
        }

        let named_completed = event
            .name
            .as_deref()
            .is_some_and(|n| n.eq_ignore_ascii_case("response.completed"));
        if analyzed.event_type.eq_ignore_ascii_case("response.completed") || named_completed {
            state.response_id = analyzed.response_id;
            state.completed = Some(event.data);
        }
    }

    async fn finish(
        &self,
        mut state: ReadState,
        session_id: &str,
    ) -> Result<StreamOutcome, PipelineError> {
        if let Some(event) = state.parser.finish() {
            self.dispatch(&mut state, event).await;
        }

        let Some(completed) = state.completed.filter(|c| !c.trim().is_empty()) else {
            error!(session_id, "Stream ended without a completed event");
            return Err(PipelineError::stream(
                codes::STREAM_EMPTY_COMPLETED,
                "Empty response from streaming model client.",
            ));
        };

        let completed_response = extract_completed_response(&completed)?;
        debug!(
            session_id,
            response_id = ?state.response_id,
            partial_chars = state.partial_text.len(),
            "Stream completed"
        );
        Ok(StreamOutcome {
            completed_response,
            response_id: state.response_id,
            partial_text: state.partial_text,
        })
    }
}

fn require_session(session_id: &str) -> Result<(), PipelineError> {
    if session_id.trim().is_empty() {
        return Err(PipelineError::stream(
            codes::STREAM_MISSING_SESSION,
            "A session id is required for the streaming reader.",
        ));
    }
    Ok(())
}

fn cancelled() -> PipelineError {
    PipelineError::stream(codes::STREAM_CANCELLED, "Streaming read cancelled.")
}

fn read_failed(e: impl Display) -> PipelineError {
    PipelineError::stream(codes::STREAM_READ_FAILED, format!("Stream read failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingProgressSink;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const DELTA: &str = r#"{"type":"response.output_text.delta","delta":"Hi"}"#;

    fn completed(id: &str) -> String {
        format!(r#"{{"type":"response.completed","response":{{"id":"{id}","output":[]}}}}"#)
    }

    fn reader() -> (StreamingResponseReader, Arc<CollectingProgressSink>) {
        let sink = Arc::new(CollectingProgressSink::new());
        (StreamingResponseReader::new(sink.clone()), sink)
    }

    #[tokio::test]
    async fn test_happy_path_returns_inner_response() {
        let (reader, sink) = reader();
        let sse = format!(
            "event: response.output_text.delta\ndata: {DELTA}\n\nevent: response.completed\ndata: {}\n\n",
            completed("resp_1")
        );

        let outcome = reader
            .read(sse.as_bytes(), "sess_1", &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.completed_response.contains("\"id\":\"resp_1\""));
        assert_eq!(outcome.response_id.as_deref(), Some("resp_1"));
        assert_eq!(outcome.partial_text, "Hi");
        assert_eq!(sink.events(), vec![ProgressEvent::LlmDelta { text: "Hi".into() }]);
    }

    #[tokio::test]
    async fn test_completed_without_trailing_blank_line() {
        let (reader, _) = reader();
        let sse = format!("event: response.completed\ndata: {}", completed("resp_4"));

        let outcome = reader
            .read(sse.as_bytes(), "sess_1", &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.completed_response.contains("\"id\":\"resp_4\""));
    }

    #[tokio::test]
    async fn test_completed_followed_by_done() {
        let (reader, _) = reader();
        let sse = format!(
            "event: response.completed\ndata: {}\ndata: [DONE]\nevent: ignored\n",
            completed("resp_3")
        );

        let outcome = reader
            .read(sse.as_bytes(), "sess_1", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.response_id.as_deref(), Some("resp_3"));
    }

    #[tokio::test]
    async fn test_malformed_delta_is_skipped() {
        let (reader, sink) = reader();
        let sse = format!(
            "event: response.output_text.delta\ndata: {{ nope\n\nevent: response.completed\ndata: {}\n\n",
            completed("resp_9")
        );

        let outcome = reader
            .read(sse.as_bytes(), "sess_1", &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.completed_response.contains("resp_9"));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_missing_completed_event_fails() {
        let (reader, _) = reader();
        let sse = format!("data: {DELTA}\n\n");

        let err = reader
            .read(sse.as_bytes(), "sess_1", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::STREAM_EMPTY_COMPLETED);
    }

    #[tokio::test]
    async fn test_missing_session_fails_before_reading() {
        let (reader, _) = reader();
        let err = reader
            .read(&b""[..], " ", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::STREAM_MISSING_SESSION);
    }

    #[tokio::test]
    async fn test_cancelled_before_read() {
        let (reader, _) = reader();
        let token = CancellationToken::new();
        token.cancel("user");

        let err = reader.read(&b"data: {}\n"[..], "sess_1", &token).await.unwrap_err();
        assert_eq!(err.code(), codes::STREAM_CANCELLED);
    }

    #[tokio::test]
    async fn test_cancelled_while_waiting_for_data() {
        let (reader, _) = reader();
        let (_writer, source) = tokio::io::duplex(64);
        let token = Arc::new(CancellationToken::new());

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel("timeout");
        });

        let err = reader
            .read(tokio::io::BufReader::new(source), "sess_1", &token)
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::STREAM_CANCELLED);
    }

    #[tokio::test]
    async fn test_split_reads_are_reassembled() {
        let (reader, _) = reader();
        let payload = completed("resp_7");
        let (head, tail) = payload.split_at(20);
        let mock = tokio_test::io::Builder::new()
            .read(b"event: response.comp")
            .read(format!("leted\ndata: {head}").as_bytes())
            .read(format!("{tail}\n\n").as_bytes())
            .build();

        let outcome = reader
            .read(tokio::io::BufReader::new(mock), "sess_1", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.response_id.as_deref(), Some("resp_7"));
    }

    #[tokio::test]
    async fn test_chunk_stream_with_unaligned_chunks() {
        let (reader, sink) = reader();
        let sse = format!(
            "data: {DELTA}\r\n\r\nevent: response.completed\r\ndata: {}",
            completed("resp_8")
        );
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = sse
            .as_bytes()
            .chunks(7)
            .map(|c| Ok(c.to_vec()))
            .collect();

        let outcome = reader
            .read_chunks(
                futures::stream::iter(chunks),
                "sess_1",
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.response_id.as_deref(), Some("resp_8"));
        assert_eq!(outcome.partial_text, "Hi");
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_chunk_stream_error_is_reported() {
        let (reader, _) = reader();
        let chunks = futures::stream::iter(vec![
            Ok(b"data: {}\n".to_vec()),
            Err(std::io::Error::other("reset")),
        ]);

        let err = reader
            .read_chunks(chunks, "sess_1", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::STREAM_READ_FAILED);
    }
}
