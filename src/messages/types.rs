use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// The upstream projection of a turn: role and content only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

/// One entry of the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    /// Display-only reasoning text.
    pub thinking: Option<String>,
    /// Display-only, submission to response.
    pub latency_ms: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            thinking: None,
            latency_ms: None,
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Attach reasoning text; empty text is treated as absent.
    pub fn with_thinking(mut self, thinking: Option<String>) -> Self {
        self.thinking = thinking.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn to_wire(&self) -> WireMessage {
        WireMessage {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// Encoded utterance captured from the microphone.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    /// WAV container bytes
    pub wav: Vec<u8>,
    pub sample_rate: u32,
    pub sample_count: usize,
}

impl Utterance {
    pub fn duration_seconds(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.sample_count as f32 / self.sample_rate as f32
    }
}

/// Input for exactly one request.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingSubmission {
    Text(String),
    Audio(Utterance),
}

impl PendingSubmission {
    pub fn is_speech(&self) -> bool {
        matches!(self, PendingSubmission::Audio(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_projection_drops_annotations() {
        let turn = ConversationTurn::assistant("Paris")
            .with_thinking(Some("the user asks about France".into()))
            .with_latency(420);

        let wire = serde_json::to_value(turn.to_wire()).unwrap();
        assert_eq!(wire, serde_json::json!({"role": "assistant", "content": "Paris"}));
    }

    #[test]
    fn test_blank_thinking_is_absent() {
        let turn = ConversationTurn::assistant("hi").with_thinking(Some("  ".into()));
        assert!(turn.thinking.is_none());
    }

    #[test]
    fn test_utterance_duration() {
        let utterance = Utterance {
            wav: Vec::new(),
            sample_rate: 16000,
            sample_count: 8000,
        };
        assert!((utterance.duration_seconds() - 0.5).abs() < f32::EPSILON);
    }
}
