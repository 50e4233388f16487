//! Completion endpoint client
//!
//! Request construction, both reply consumers and the suggestions endpoint.

pub mod single_shot;
pub mod streaming;
pub mod submit;
pub mod suggestions;
pub mod think;

pub use single_shot::{parse_reply_headers, SingleShotReply};
pub use streaming::{record_stream, RecordKind, StreamAccumulator, StreamRecord};
pub use submit::{ChatClient, TurnForm, UsageEvent, UsageTracker};
pub use suggestions::SuggestionsClient;
pub use think::{split_complete, Segment, SegmentKind, ThinkSplitter};

use reqwest::header::{HeaderMap, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

/// How the reply body is delivered and consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    /// Spoken audio body, text in headers
    #[default]
    SingleShot,
    /// Server-sent text events
    Streaming,
}

impl ResponseMode {
    /// Value of the `Accept` header requesting this mode
    pub fn accept(&self) -> &'static str {
        match self {
            ResponseMode::SingleShot => "audio/*, */*",
            ResponseMode::Streaming => "text/event-stream",
        }
    }

    /// Event-stream content always wins over the configured mode.
    pub fn detect(headers: &HeaderMap) -> Self {
        let is_event_stream = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_start().starts_with("text/event-stream"))
            .unwrap_or(false);

        if is_event_stream {
            ResponseMode::Streaming
        } else {
            ResponseMode::SingleShot
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_mode_from_config_text() {
        let mode: ResponseMode = serde_json::from_str("\"streaming\"").unwrap();
        assert_eq!(mode, ResponseMode::Streaming);
        assert_eq!(mode.accept(), "text/event-stream");
    }

    #[test]
    fn test_detect_reply_kind() {
        let mut headers = HeaderMap::new();
        assert_eq!(ResponseMode::detect(&headers), ResponseMode::SingleShot);

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream; charset=utf-8"));
        assert_eq!(ResponseMode::detect(&headers), ResponseMode::Streaming);

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("audio/wav"));
        assert_eq!(ResponseMode::detect(&headers), ResponseMode::SingleShot);
    }
}
