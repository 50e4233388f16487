//! Turn submission to the completion endpoint

use crate::client::ResponseMode;
use crate::messages::{PendingSubmission, WireMessage};
use crate::{ParrotError, Result};
use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const INPUT_FIELD: &str = "input";
pub const MESSAGE_FIELD: &str = "message";
pub const AUDIO_FILE_NAME: &str = "audio.wav";
pub const AUDIO_MIME: &str = "audio/wav";

/// Value of one multipart field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue {
    Text(String),
    File {
        file_name: String,
        mime: String,
        bytes: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    pub value: FormValue,
}

/// Deterministic description of the multipart body for one turn.
///
/// Identical submissions over identical history build equal forms; only the
/// transport boundary differs between requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnForm {
    fields: Vec<FormField>,
}

impl TurnForm {
    pub fn build(submission: &PendingSubmission, history: &[WireMessage]) -> Result<Self> {
        let input = match submission {
            PendingSubmission::Text(text) => {
                if text.trim().is_empty() {
                    return Err(ParrotError::EmptyInput);
                }
                FormValue::Text(text.clone())
            }
            PendingSubmission::Audio(utterance) => {
                if utterance.wav.is_empty() {
                    return Err(ParrotError::EmptyInput);
                }
                FormValue::File {
                    file_name: AUDIO_FILE_NAME.to_string(),
                    mime: AUDIO_MIME.to_string(),
                    bytes: utterance.wav.clone(),
                }
            }
        };

        let mut fields = Vec::with_capacity(history.len() + 1);
        fields.push(FormField {
            name: INPUT_FIELD.to_string(),
            value: input,
        });

        for message in history {
            let json = serde_json::to_string(message)
                .map_err(|e| ParrotError::InvalidResponse(format!("Unserializable message: {}", e)))?;
            fields.push(FormField {
                name: MESSAGE_FIELD.to_string(),
                value: FormValue::Text(json),
            });
        }

        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    pub fn into_multipart(self) -> Result<Form> {
        let mut form = Form::new();
        for field in self.fields {
            form = match field.value {
                FormValue::Text(text) => form.text(field.name, text),
                FormValue::File {
                    file_name,
                    mime,
                    bytes,
                } => {
                    let part = Part::bytes(bytes).file_name(file_name).mime_str(&mime)?;
                    form.part(field.name, part)
                }
            };
        }
        Ok(form)
    }
}

/// Usage analytics event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageEvent {
    TextInput,
    SpeechInput,
}

impl UsageEvent {
    pub fn label(&self) -> &'static str {
        match self {
            UsageEvent::TextInput => "Text input",
            UsageEvent::SpeechInput => "Speech input",
        }
    }
}

/// External analytics collaborator
pub trait UsageTracker: Send + Sync {
    fn track(&self, event: UsageEvent);
}

/// Records usage events as log lines.
#[derive(Debug, Default)]
pub struct TracingUsageTracker;

impl UsageTracker for TracingUsageTracker {
    fn track(&self, event: UsageEvent) {
        info!(event = event.label(), "usage");
    }
}

/// Client for the completion endpoint
#[derive(Clone)]
pub struct ChatClient {
    http: Client,
    endpoint: String,
    mode: ResponseMode,
    tracker: Arc<dyn UsageTracker>,
}

impl ChatClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ParrotError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            mode: ResponseMode::default(),
            tracker: Arc::new(TracingUsageTracker),
        })
    }

    pub fn with_mode(mut self, mode: ResponseMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn UsageTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST one turn. Only successful responses are returned.
    pub async fn submit(
        &self,
        submission: &PendingSubmission,
        history: &[WireMessage],
    ) -> Result<Response> {
        let form = TurnForm::build(submission, history)?;

        self.tracker.track(if submission.is_speech() {
            UsageEvent::SpeechInput
        } else {
            UsageEvent::TextInput
        });

        debug!(
            "Submitting turn with {} prior messages to {}",
            history.len(),
            self.endpoint
        );

        let response = self
            .http
            .post(&self.endpoint)
            .header(ACCEPT, self.mode.accept())
            .multipart(form.into_multipart()?)
            .send()
            .await?;

        check_status(response).await
    }
}

/// Map non-success statuses to errors, reading the body as the message.
pub async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        warn!("Completion endpoint rate limited the request");
        return Err(ParrotError::RateLimited);
    }

    let message = response.text().await.unwrap_or_default();
    warn!("Completion endpoint returned {}: {}", status, message);
    Err(ParrotError::Http {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{Role, Utterance};

    fn history() -> Vec<WireMessage> {
        vec![
            WireMessage {
                role: Role::User,
                content: "Hello".into(),
            },
            WireMessage {
                role: Role::Assistant,
                content: "Hi there".into(),
            },
        ]
    }

    #[test]
    fn test_text_form_layout() {
        let submission = PendingSubmission::Text("What is the capital of France".into());
        let form = TurnForm::build(&submission, &history()).unwrap();

        let fields = form.fields();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].name, INPUT_FIELD);
        assert_eq!(
            fields[0].value,
            FormValue::Text("What is the capital of France".into())
        );
        assert_eq!(fields[1].name, MESSAGE_FIELD);
        assert_eq!(
            fields[1].value,
            FormValue::Text(r#"{"role":"user","content":"Hello"}"#.into())
        );
        assert_eq!(
            fields[2].value,
            FormValue::Text(r#"{"role":"assistant","content":"Hi there"}"#.into())
        );
    }

    #[test]
    fn test_form_is_idempotent() {
        let submission = PendingSubmission::Text("What is the capital of France".into());
        let first = TurnForm::build(&submission, &history()).unwrap();
        let second = TurnForm::build(&submission, &history()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_audio_form_uses_file_part() {
        let submission = PendingSubmission::Audio(Utterance {
            wav: vec![b'R', b'I', b'F', b'F'],
            sample_rate: 16000,
            sample_count: 0,
        });
        let form = TurnForm::build(&submission, &[]).unwrap();

        match &form.fields()[0].value {
            FormValue::File { file_name, mime, bytes } => {
                assert_eq!(file_name, AUDIO_FILE_NAME);
                assert_eq!(mime, AUDIO_MIME);
                assert_eq!(bytes.len(), 4);
            }
            other => panic!("expected file part, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_input_rejected() {
        let submission = PendingSubmission::Text("   ".into());
        assert!(matches!(
            TurnForm::build(&submission, &history()),
            Err(ParrotError::EmptyInput)
        ));
    }

    #[test]
    fn test_into_multipart() {
        let submission = PendingSubmission::Text("hi".into());
        let form = TurnForm::build(&submission, &history()).unwrap();
        assert!(form.into_multipart().is_ok());
    }

    #[test]
    fn test_usage_labels() {
        assert_eq!(UsageEvent::TextInput.label(), "Text input");
        assert_eq!(UsageEvent::SpeechInput.label(), "Speech input");
    }
}
