//! Server-sent event consumption for streaming replies
//!
//! The body is a sequence of `data: {...}` records. Framing across network
//! chunks is handled by `eventsource-stream`; this module decodes the JSON
//! payloads and accumulates content and reasoning for one turn.

use crate::client::think::{Segment, SegmentKind, ThinkSplitter};
use crate::{ParrotError, Result};
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Data line that terminates a stream early
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Content,
    /// Structured reasoning frame, bypasses marker detection
    Thinking,
    Error,
    #[serde(other)]
    Unknown,
}

/// One decoded `data:` record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRecord {
    #[serde(rename = "type")]
    pub kind: RecordKind,
    #[serde(default)]
    pub content: String,
}

impl StreamRecord {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            kind: RecordKind::Content,
            content: text.into(),
        }
    }
}

/// Decode one `data:` payload. `Ok(None)` marks the end-of-stream sentinel.
pub fn parse_record(data: &str) -> Result<Option<StreamRecord>> {
    let data = data.trim();
    if data == DONE_SENTINEL {
        return Ok(None);
    }
    serde_json::from_str(data)
        .map(Some)
        .map_err(|e| ParrotError::Stream(format!("Malformed stream record: {}", e)))
}

/// Turn a response body into a stream of records, in arrival order.
///
/// Malformed records are logged and skipped. A transport error ends the
/// stream after yielding it.
pub fn record_stream<S, B, E>(body: S) -> impl Stream<Item = Result<StreamRecord>>
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut events = body.eventsource();

    async_stream::stream! {
        while let Some(event) = events.next().await {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    yield Err(ParrotError::Stream(format!("Stream interrupted: {}", e)));
                    break;
                }
            };

            match parse_record(&event.data) {
                Ok(Some(record)) => {
                    debug!("Stream record: {:?}", record.kind);
                    yield Ok(record);
                }
                Ok(None) => {
                    debug!("Stream sentinel received");
                    break;
                }
                Err(e) => {
                    warn!("Skipping record: {} (data: {:?})", e, event.data);
                }
            }
        }
    }
}

/// Per-turn buffers for a streamed reply.
#[derive(Debug, Clone, Default)]
pub struct StreamAccumulator {
    content: String,
    thinking: String,
    splitter: ThinkSplitter,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route one content token. Returns the resolved segments.
    pub fn push_token(&mut self, token: &str) -> Vec<Segment> {
        let segments = self.splitter.feed(token);
        for segment in &segments {
            self.append(segment);
        }
        segments
    }

    /// Append text from a structured reasoning frame.
    pub fn push_thinking(&mut self, text: &str) {
        self.thinking.push_str(text);
    }

    /// Release held-back marker text at end of stream.
    pub fn finish(&mut self) {
        if let Some(segment) = self.splitter.flush() {
            self.append(&segment);
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn thinking(&self) -> &str {
        &self.thinking
    }

    pub fn is_inside_thinking(&self) -> bool {
        self.splitter.is_inside_thinking()
    }

    pub fn reset(&mut self) {
        self.content.clear();
        self.thinking.clear();
        self.splitter.reset();
    }

    fn append(&mut self, segment: &Segment) {
        match segment.kind {
            SegmentKind::Content => self.content.push_str(&segment.text),
            SegmentKind::Thinking => self.thinking.push_str(&segment.text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn body(chunks: &[&str]) -> impl Stream<Item = std::result::Result<Vec<u8>, std::io::Error>> + Unpin {
        let chunks: Vec<_> = chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect();
        stream::iter(chunks)
    }

    async fn collect(chunks: &[&str]) -> Vec<Result<StreamRecord>> {
        let records = record_stream(body(chunks));
        futures::pin_mut!(records);
        let mut out = Vec::new();
        while let Some(item) = records.next().await {
            out.push(item);
        }
        out
    }

    #[test]
    fn test_parse_record() {
        let record = parse_record(r#"{"type":"content","content":"Hi"}"#).unwrap();
        assert_eq!(record, Some(StreamRecord::content("Hi")));

        let record = parse_record(r#"{"type":"error","content":"boom"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(record.kind, RecordKind::Error);

        assert_eq!(parse_record("[DONE]").unwrap(), None);
        assert!(parse_record("{not json").is_err());
    }

    #[test]
    fn test_unknown_kind_is_tolerated() {
        let record = parse_record(r#"{"type":"usage"}"#).unwrap().unwrap();
        assert_eq!(record.kind, RecordKind::Unknown);
        assert!(record.content.is_empty());
    }

    #[tokio::test]
    async fn test_records_in_order() {
        let records = collect(&[
            "data: {\"type\":\"content\",\"content\":\"Hel\"}\n\n",
            "data: {\"type\":\"content\",\"content\":\"lo\"}\n\n",
        ])
        .await;

        let texts: Vec<String> = records.into_iter().map(|r| r.unwrap().content).collect();
        assert_eq!(texts, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_record_split_across_chunks() {
        let records = collect(&[
            "data: {\"type\":\"con",
            "tent\",\"content\":\"whole\"}\n",
            "\n",
        ])
        .await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].as_ref().unwrap().content, "whole");
    }

    #[tokio::test]
    async fn test_malformed_record_skipped_and_sentinel_stops() {
        let records = collect(&[
            "data: garbage\n\n",
            "data: {\"type\":\"content\",\"content\":\"ok\"}\n\n",
            "data: [DONE]\n\n",
            "data: {\"type\":\"content\",\"content\":\"late\"}\n\n",
        ])
        .await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].as_ref().unwrap().content, "ok");
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream() {
        let chunks: Vec<std::result::Result<Vec<u8>, std::io::Error>> = vec![
            Ok(b"data: {\"type\":\"content\",\"content\":\"part\"}\n\n".to_vec()),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            Ok(b"data: {\"type\":\"content\",\"content\":\"never\"}\n\n".to_vec()),
        ];
        let records = record_stream(stream::iter(chunks));
        futures::pin_mut!(records);

        let first = records.next().await.unwrap().unwrap();
        assert_eq!(first.content, "part");
        assert!(matches!(records.next().await, Some(Err(ParrotError::Stream(_)))));
        assert!(records.next().await.is_none());
    }

    #[test]
    fn test_accumulator_content_equals_outside_tokens() {
        let tokens = ["<think>", "weighing ", "options", "</think>", "The answer", " is 42."];
        let mut acc = StreamAccumulator::new();
        for token in tokens {
            acc.push_token(token);
        }
        acc.finish();

        assert_eq!(acc.content(), "The answer is 42.");
        assert_eq!(acc.thinking(), "weighing options");
    }

    #[test]
    fn test_accumulator_structured_thinking() {
        let mut acc = StreamAccumulator::new();
        acc.push_thinking("plan");
        acc.push_token("done");
        assert_eq!(acc.thinking(), "plan");
        assert_eq!(acc.content(), "done");

        acc.reset();
        assert!(acc.content().is_empty());
        assert!(acc.thinking().is_empty());
    }
}
