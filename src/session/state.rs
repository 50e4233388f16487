//! Session state
//!
//! Everything the front end shows lives in one `SessionState`. Changes go
//! through `apply`, which never performs I/O.

use crate::audio::CaptureAvailability;
use crate::client::StreamAccumulator;
use crate::messages::{ConversationHistory, ConversationTurn, WireMessage};
use crate::{ParrotError, Result};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// Notifications older than this are dropped
const MAX_NOTIFICATIONS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Error,
}

/// A toast-style message for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

/// Canned openers that prefill the input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTemplate {
    WriteCode,
    ExplainConcept,
    SearchDocs,
    GenerateText,
}

impl PromptTemplate {
    pub const ALL: [PromptTemplate; 4] = [
        PromptTemplate::WriteCode,
        PromptTemplate::ExplainConcept,
        PromptTemplate::SearchDocs,
        PromptTemplate::GenerateText,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            PromptTemplate::WriteCode => "Write code",
            PromptTemplate::ExplainConcept => "Explain concept",
            PromptTemplate::SearchDocs => "Search docs",
            PromptTemplate::GenerateText => "Generate text",
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            PromptTemplate::WriteCode => "Write code to ",
            PromptTemplate::ExplainConcept => "Explain the concept of ",
            PromptTemplate::SearchDocs => "Find documentation about ",
            PromptTemplate::GenerateText => "Generate text for ",
        }
    }
}

/// Everything that can happen to a session
#[derive(Debug, Clone)]
pub enum SessionAction {
    InputChanged(String),
    ClearInput,
    ApplyTemplate(PromptTemplate),
    SuggestionAccepted(String),
    SuggestionsReceived {
        query: String,
        suggestions: Vec<String>,
    },

    SubmitStarted,
    SubmitFailed(ParrotError),

    /// Single-shot reply accepted
    TurnCompleted {
        transcript: String,
        answer: String,
        thinking: Option<String>,
        latency_ms: u64,
    },

    StreamStarted,
    StreamToken(String),
    StreamThinking(String),
    StreamError(String),
    /// `user_content` is the turn's input text when known
    StreamFinished {
        user_content: Option<String>,
        latency_ms: u64,
    },

    ToggleThinking,
    CaptureAvailabilityChanged(CaptureAvailability),
    Notify(Notification),
    ClearHistory,
}

#[derive(Debug, Clone)]
pub struct SessionState {
    pub history: ConversationHistory,
    pub input_text: String,
    pub is_pending: bool,
    pub suggestions: Vec<String>,
    /// Live view of a reply being streamed
    pub streaming: Option<StreamAccumulator>,
    pub show_thinking: bool,
    pub capture: CaptureAvailability,
    notifications: VecDeque<Notification>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            history: ConversationHistory::new(),
            input_text: String::new(),
            is_pending: false,
            suggestions: Vec::new(),
            streaming: None,
            show_thinking: true,
            capture: CaptureAvailability::Loading,
            notifications: VecDeque::new(),
        }
    }

    /// Role and content of every turn so far, for the next request
    pub fn wire_history(&self) -> Vec<WireMessage> {
        self.history.wire_messages()
    }

    /// Mark a submission in flight, rejecting a second one.
    pub fn begin_submit(&mut self) -> Result<()> {
        if self.is_pending {
            warn!("Submission rejected: another is in flight");
            return Err(ParrotError::SubmissionPending);
        }
        self.apply(SessionAction::SubmitStarted);
        Ok(())
    }

    pub fn notifications(&self) -> impl Iterator<Item = &Notification> {
        self.notifications.iter()
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        self.notifications.drain(..).collect()
    }

    pub fn apply(&mut self, action: SessionAction) {
        match action {
            SessionAction::InputChanged(text) => {
                if text.trim().is_empty() {
                    self.suggestions.clear();
                }
                self.input_text = text;
            }
            SessionAction::ClearInput => {
                self.input_text.clear();
                self.suggestions.clear();
            }
            SessionAction::ApplyTemplate(template) => {
                self.input_text = template.prefix().to_string();
                self.suggestions.clear();
            }
            SessionAction::SuggestionAccepted(suggestion) => {
                self.input_text = format!("{} {}", self.input_text, suggestion);
                self.suggestions.clear();
            }
            SessionAction::SuggestionsReceived { query, suggestions } => {
                if self.is_pending || query != self.input_text {
                    debug!("Dropping stale suggestions for {:?}", query);
                    return;
                }
                self.suggestions = suggestions;
            }

            SessionAction::SubmitStarted => {
                self.is_pending = true;
                self.suggestions.clear();
            }
            SessionAction::SubmitFailed(error) => {
                self.is_pending = false;
                self.streaming = None;
                self.push_notification(Notification::error(error.user_message()));
            }

            SessionAction::TurnCompleted {
                transcript,
                answer,
                thinking,
                latency_ms,
            } => {
                self.history.push(ConversationTurn::user(transcript.clone()));
                self.history.push(
                    ConversationTurn::assistant(answer)
                        .with_thinking(thinking)
                        .with_latency(latency_ms),
                );
                self.input_text = transcript;
                self.is_pending = false;
                info!("Turn completed in {}ms", latency_ms);
            }

            SessionAction::StreamStarted => {
                self.streaming = Some(StreamAccumulator::new());
            }
            SessionAction::StreamToken(token) => {
                if let Some(acc) = self.streaming.as_mut() {
                    acc.push_token(&token);
                }
            }
            SessionAction::StreamThinking(text) => {
                if let Some(acc) = self.streaming.as_mut() {
                    acc.push_thinking(&text);
                }
            }
            SessionAction::StreamError(message) => {
                self.push_notification(Notification::error(message));
            }
            SessionAction::StreamFinished {
                user_content,
                latency_ms,
            } => {
                self.is_pending = false;
                let Some(mut acc) = self.streaming.take() else {
                    return;
                };
                acc.finish();

                // Committed exactly as received
                let content = acc.content();
                if content.is_empty() {
                    debug!("Stream ended without visible content");
                    return;
                }

                if let Some(user) = user_content.filter(|u| !u.trim().is_empty()) {
                    self.history.push(ConversationTurn::user(user));
                }
                let thinking = Some(acc.thinking().trim().to_string());
                self.history.push(
                    ConversationTurn::assistant(content)
                        .with_thinking(thinking)
                        .with_latency(latency_ms),
                );
                info!("Streamed turn completed in {}ms", latency_ms);
            }

            SessionAction::ToggleThinking => {
                self.show_thinking = !self.show_thinking;
            }
            SessionAction::CaptureAvailabilityChanged(availability) => {
                if let CaptureAvailability::Unavailable(reason) = &availability {
                    self.push_notification(Notification::info(format!(
                        "Voice input unavailable: {}",
                        reason
                    )));
                }
                self.capture = availability;
            }
            SessionAction::Notify(notification) => self.push_notification(notification),
            SessionAction::ClearHistory => {
                self.history.clear();
                self.streaming = None;
            }
        }
    }

    fn push_notification(&mut self, notification: Notification) {
        if self.notifications.len() >= MAX_NOTIFICATIONS {
            self.notifications.pop_front();
        }
        self.notifications.push_back(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Role;

    fn complete(state: &mut SessionState, transcript: &str, answer: &str) {
        state.begin_submit().unwrap();
        state.apply(SessionAction::TurnCompleted {
            transcript: transcript.into(),
            answer: answer.into(),
            thinking: None,
            latency_ms: 120,
        });
    }

    #[test]
    fn test_turn_completed_appends_two_turns() {
        let mut state = SessionState::new();
        complete(&mut state, "What is 2+2?", "4");

        let turns = state.history.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].role, Role::Assistant);
        assert_eq!(turns[1].latency_ms, Some(120));
        assert_eq!(state.input_text, "What is 2+2?");
        assert!(!state.is_pending);
    }

    #[test]
    fn test_second_submit_rejected_while_pending() {
        let mut state = SessionState::new();
        state.begin_submit().unwrap();
        assert!(matches!(
            state.begin_submit(),
            Err(ParrotError::SubmissionPending)
        ));
    }

    #[test]
    fn test_rate_limit_leaves_history_untouched() {
        let mut state = SessionState::new();
        complete(&mut state, "hi", "hello");
        let before = state.history.len();

        state.begin_submit().unwrap();
        state.apply(SessionAction::SubmitFailed(ParrotError::RateLimited));

        assert_eq!(state.history.len(), before);
        assert!(!state.is_pending);
        let notes = state.take_notifications();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].message, "Too many requests. Please try again later.");
        assert!(state.take_notifications().is_empty());
    }

    #[test]
    fn test_streamed_turn_splits_thinking() {
        let mut state = SessionState::new();
        state.begin_submit().unwrap();
        state.apply(SessionAction::StreamStarted);
        for token in ["<thi", "nk>hmm</th", "ink>The answer", " is 4."] {
            state.apply(SessionAction::StreamToken(token.into()));
        }
        state.apply(SessionAction::StreamFinished {
            user_content: Some("What is 2+2?".into()),
            latency_ms: 300,
        });

        let turns = state.history.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].content, "What is 2+2?");
        assert_eq!(turns[1].content, "The answer is 4.");
        assert_eq!(turns[1].thinking.as_deref(), Some("hmm"));
        assert!(state.streaming.is_none());
        assert!(!state.is_pending);
    }

    #[test]
    fn test_streamed_content_keeps_whitespace() {
        let mut state = SessionState::new();
        state.begin_submit().unwrap();
        state.apply(SessionAction::StreamStarted);
        let tokens = ["  Hello", ", world", "\n\n"];
        for token in tokens {
            state.apply(SessionAction::StreamToken(token.into()));
        }
        state.apply(SessionAction::StreamFinished {
            user_content: None,
            latency_ms: 5,
        });

        assert_eq!(state.history.len(), 1);
        assert_eq!(state.history.turns()[0].content, tokens.concat());
    }

    #[test]
    fn test_whitespace_only_stream_is_committed() {
        let mut state = SessionState::new();
        state.begin_submit().unwrap();
        state.apply(SessionAction::StreamStarted);
        state.apply(SessionAction::StreamToken(" ".into()));
        state.apply(SessionAction::StreamFinished {
            user_content: None,
            latency_ms: 5,
        });

        assert_eq!(state.history.len(), 1);
        assert_eq!(state.history.turns()[0].content, " ");
    }

    #[test]
    fn test_stream_error_keeps_partial_content() {
        let mut state = SessionState::new();
        state.begin_submit().unwrap();
        state.apply(SessionAction::StreamStarted);
        state.apply(SessionAction::StreamToken("Partial".into()));
        state.apply(SessionAction::StreamError("upstream failed".into()));
        state.apply(SessionAction::StreamFinished {
            user_content: None,
            latency_ms: 10,
        });

        assert_eq!(state.history.len(), 1);
        assert_eq!(state.history.turns()[0].content, "Partial");
        assert_eq!(state.take_notifications()[0].message, "upstream failed");
    }

    #[test]
    fn test_empty_stream_appends_nothing() {
        let mut state = SessionState::new();
        state.begin_submit().unwrap();
        state.apply(SessionAction::StreamStarted);
        state.apply(SessionAction::StreamToken("<think>only thoughts</think>".into()));
        state.apply(SessionAction::StreamFinished {
            user_content: Some("hi".into()),
            latency_ms: 10,
        });

        assert!(state.history.is_empty());
        assert!(!state.is_pending);
    }

    #[test]
    fn test_stale_suggestions_dropped() {
        let mut state = SessionState::new();
        state.apply(SessionAction::InputChanged("prog".into()));
        state.apply(SessionAction::InputChanged("progr".into()));

        state.apply(SessionAction::SuggestionsReceived {
            query: "prog".into(),
            suggestions: vec!["ramming".into()],
        });
        assert!(state.suggestions.is_empty());

        state.apply(SessionAction::SuggestionsReceived {
            query: "progr".into(),
            suggestions: vec!["amming".into()],
        });
        assert_eq!(state.suggestions, vec!["amming"]);

        state.apply(SessionAction::SuggestionAccepted("amming".into()));
        assert_eq!(state.input_text, "progr amming");
        assert!(state.suggestions.is_empty());
    }

    #[test]
    fn test_empty_input_clears_suggestions() {
        let mut state = SessionState::new();
        state.apply(SessionAction::InputChanged("wh".into()));
        state.apply(SessionAction::SuggestionsReceived {
            query: "wh".into(),
            suggestions: vec!["at".into()],
        });
        state.apply(SessionAction::InputChanged(String::new()));
        assert!(state.suggestions.is_empty());
    }

    #[test]
    fn test_template_and_toggle() {
        let mut state = SessionState::new();
        state.apply(SessionAction::ApplyTemplate(PromptTemplate::ExplainConcept));
        assert_eq!(state.input_text, "Explain the concept of ");

        assert!(state.show_thinking);
        state.apply(SessionAction::ToggleThinking);
        assert!(!state.show_thinking);
    }

    #[test]
    fn test_capture_unavailable_notifies() {
        let mut state = SessionState::new();
        state.apply(SessionAction::CaptureAvailabilityChanged(
            CaptureAvailability::Unavailable("no model".into()),
        ));
        assert!(!state.capture.is_available());
        assert_eq!(state.take_notifications().len(), 1);
    }
}
