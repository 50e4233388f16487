//! One conversational turn, end to end
//!
//! Submit -> consume the reply (single-shot or streamed) -> hand audio to the
//! sink -> fold the outcome into the session.

use crate::audio::{AudioSink, DeviceLock, PcmFormat};
use crate::client::single_shot::{decode_header, TRANSCRIPT_HEADER};
use crate::client::suggestions::is_suggestible;
use crate::client::{
    parse_reply_headers, record_stream, ChatClient, RecordKind, ResponseMode, SuggestionsClient,
};
use crate::messages::PendingSubmission;
use crate::session::{SessionAction, SessionState};
use crate::utils::{DelayedTask, LatencyTracker, Stopwatch};
use crate::{ParrotError, Result};
use futures::StreamExt;
use reqwest::Response;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// How a successful turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Single-shot reply; audio handed to the sink when `playback_started`
    Spoken {
        transcript: String,
        answer: String,
        latency_ms: u64,
        playback_started: bool,
    },
    /// Streamed reply; `committed` is false when nothing visible arrived
    Streamed {
        content: String,
        latency_ms: u64,
        committed: bool,
    },
}

pub struct TurnPipeline {
    client: ChatClient,
    sink: Arc<dyn AudioSink>,
    lock: DeviceLock,
    playback: PcmFormat,
    latency: LatencyTracker,
}

impl TurnPipeline {
    pub fn new(client: ChatClient, sink: Arc<dyn AudioSink>, lock: DeviceLock) -> Self {
        Self {
            client,
            sink,
            lock,
            playback: PcmFormat::default(),
            latency: LatencyTracker::new(100),
        }
    }

    pub fn with_playback_format(mut self, format: PcmFormat) -> Self {
        self.playback = format;
        self
    }

    pub fn latency(&self) -> &LatencyTracker {
        &self.latency
    }

    pub fn sink(&self) -> &Arc<dyn AudioSink> {
        &self.sink
    }

    /// Run one turn against `state`.
    ///
    /// Failures are folded into the session as a notification and returned;
    /// history is left untouched.
    pub async fn run_turn(
        &mut self,
        state: &mut SessionState,
        submission: PendingSubmission,
    ) -> Result<TurnOutcome> {
        if let PendingSubmission::Text(text) = &submission {
            if text.trim().is_empty() {
                return Err(ParrotError::EmptyInput);
            }
        }
        state.begin_submit()?;

        let stopwatch = Stopwatch::start();
        match self.execute(state, &submission, &stopwatch).await {
            Ok(outcome) => {
                let latency_ms = match &outcome {
                    TurnOutcome::Spoken { latency_ms, .. } => *latency_ms,
                    TurnOutcome::Streamed { latency_ms, .. } => *latency_ms,
                };
                self.latency.record(latency_ms);
                Ok(outcome)
            }
            Err(e) => {
                error!("Turn failed: {}", e);
                state.apply(SessionAction::SubmitFailed(e.clone()));
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        state: &mut SessionState,
        submission: &PendingSubmission,
        stopwatch: &Stopwatch,
    ) -> Result<TurnOutcome> {
        let history = state.wire_history();
        let response = self.client.submit(submission, &history).await?;

        match ResponseMode::detect(response.headers()) {
            ResponseMode::SingleShot => self.consume_single_shot(state, response, stopwatch),
            ResponseMode::Streaming => {
                self.consume_stream(state, submission, response, stopwatch)
                    .await
            }
        }
    }

    fn consume_single_shot(
        &self,
        state: &mut SessionState,
        response: Response,
        stopwatch: &Stopwatch,
    ) -> Result<TurnOutcome> {
        let reply = parse_reply_headers(response.headers())?;
        let latency_ms = stopwatch.elapsed_ms();

        let playback_started = self.start_playback(response);

        state.apply(SessionAction::TurnCompleted {
            transcript: reply.transcript.clone(),
            answer: reply.answer.clone(),
            thinking: reply.thinking,
            latency_ms,
        });

        Ok(TurnOutcome::Spoken {
            transcript: reply.transcript,
            answer: reply.answer,
            latency_ms,
            playback_started,
        })
    }

    /// Hand the response body to the sink. Returns false when audio is
    /// skipped.
    fn start_playback(&self, response: Response) -> bool {
        if let Err(e) = self.lock.begin_playback() {
            warn!("Skipping reply audio: {}", e);
            return false;
        }

        let (chunk_tx, chunk_rx) = crossbeam_channel::unbounded::<Vec<u8>>();
        let lock = self.lock.clone();
        let on_complete = Box::new(move || {
            debug!("Playback complete");
            lock.finish_playback();
        });

        if let Err(e) = self.sink.play(chunk_rx, self.playback, on_complete) {
            warn!("Failed to start playback: {}", e);
            self.lock.finish_playback();
            return false;
        }

        let mut body = Box::pin(response.bytes_stream());
        tokio::spawn(async move {
            let mut listening = true;
            let mut total = 0usize;
            // The body is always read to the end; a stopped sink only stops
            // receiving.
            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(bytes) => {
                        total += bytes.len();
                        if listening && chunk_tx.send(bytes.to_vec()).is_err() {
                            debug!("Playback stopped, discarding remaining audio");
                            listening = false;
                        }
                    }
                    Err(e) => {
                        warn!("Reply audio interrupted: {}", e);
                        break;
                    }
                }
            }
            debug!("Reply audio body finished: {} bytes", total);
        });

        true
    }

    async fn consume_stream(
        &self,
        state: &mut SessionState,
        submission: &PendingSubmission,
        response: Response,
        stopwatch: &Stopwatch,
    ) -> Result<TurnOutcome> {
        let user_content = match submission {
            PendingSubmission::Text(text) => Some(text.clone()),
            PendingSubmission::Audio(_) => decode_header(response.headers(), TRANSCRIPT_HEADER)
                .ok()
                .filter(|t| !t.trim().is_empty()),
        };

        state.apply(SessionAction::StreamStarted);

        let mut records = std::pin::pin!(record_stream(Box::pin(response.bytes_stream())));
        let mut token_count = 0usize;

        while let Some(record) = records.next().await {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    warn!("Stream ended early: {}", e);
                    state.apply(SessionAction::StreamError(e.user_message()));
                    break;
                }
            };

            match record.kind {
                RecordKind::Content => {
                    token_count += 1;
                    state.apply(SessionAction::StreamToken(record.content));
                }
                RecordKind::Thinking => state.apply(SessionAction::StreamThinking(record.content)),
                RecordKind::Error => {
                    let message = if record.content.trim().is_empty() {
                        "An error occurred.".to_string()
                    } else {
                        record.content
                    };
                    warn!("Error record mid-stream: {}", message);
                    state.apply(SessionAction::StreamError(message));
                    break;
                }
                RecordKind::Unknown => debug!("Ignoring record of unknown type"),
            }
        }

        let latency_ms = stopwatch.elapsed_ms();
        let before = state.history.len();
        state.apply(SessionAction::StreamFinished {
            user_content,
            latency_ms,
        });

        let committed = state.history.len() > before;
        let content = if committed {
            state
                .history
                .last_assistant()
                .map(|turn| turn.content.clone())
                .unwrap_or_default()
        } else {
            String::new()
        };

        info!(
            "Stream finished: {} tokens, {}ms, committed: {}",
            token_count, latency_ms, committed
        );

        Ok(TurnOutcome::Streamed {
            content,
            latency_ms,
            committed,
        })
    }
}

/// Debounced autocomplete.
///
/// Results arrive as `SessionAction::SuggestionsReceived` on the returned
/// receiver; the session drops the ones for outdated input.
pub struct SuggestionDebouncer {
    client: SuggestionsClient,
    task: DelayedTask,
    results: mpsc::UnboundedSender<SessionAction>,
}

impl SuggestionDebouncer {
    pub fn new(
        client: SuggestionsClient,
        delay: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<SessionAction>) {
        let (results, results_rx) = mpsc::unbounded_channel();
        (
            Self {
                client,
                task: DelayedTask::new(delay),
                results,
            },
            results_rx,
        )
    }

    /// React to an edit of the input text.
    pub fn input_changed(&mut self, text: &str) {
        if !is_suggestible(text) {
            self.task.cancel();
            return;
        }

        let client = self.client.clone();
        let results = self.results.clone();
        let query = text.to_string();

        self.task.schedule(async move {
            let suggestions = client.fetch(&query).await;
            let _ = results.send(SessionAction::SuggestionsReceived { query, suggestions });
        });
    }

    pub fn cancel(&mut self) {
        self.task.cancel();
    }

    pub fn is_pending(&self) -> bool {
        self.task.is_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::NullSink;

    fn pipeline() -> TurnPipeline {
        let client =
            ChatClient::new("http://127.0.0.1:9/api", Duration::from_millis(200)).unwrap();
        TurnPipeline::new(client, Arc::new(NullSink), DeviceLock::new())
    }

    #[tokio::test]
    async fn test_empty_text_never_submits() {
        let mut state = SessionState::new();
        let result = pipeline()
            .run_turn(&mut state, PendingSubmission::Text("  ".into()))
            .await;

        assert!(matches!(result, Err(ParrotError::EmptyInput)));
        assert!(!state.is_pending);
        assert!(state.take_notifications().is_empty());
    }

    #[tokio::test]
    async fn test_pending_session_rejects_turn() {
        let mut state = SessionState::new();
        state.begin_submit().unwrap();

        let result = pipeline()
            .run_turn(&mut state, PendingSubmission::Text("hello".into()))
            .await;
        assert!(matches!(result, Err(ParrotError::SubmissionPending)));
        assert!(state.is_pending);
    }

    #[tokio::test]
    async fn test_transport_failure_notifies() {
        let mut state = SessionState::new();
        let result = pipeline()
            .run_turn(&mut state, PendingSubmission::Text("hello".into()))
            .await;

        assert!(matches!(result, Err(ParrotError::Transport(_))));
        assert!(state.history.is_empty());
        assert!(!state.is_pending);
        assert_eq!(
            state.take_notifications()[0].message,
            "Something went wrong. Please try again."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_input_schedules_nothing() {
        let client =
            SuggestionsClient::new("http://127.0.0.1:9/s", Duration::from_millis(50)).unwrap();
        let (mut debouncer, _rx) = SuggestionDebouncer::new(client, Duration::from_millis(300));

        debouncer.input_changed("w");
        assert!(!debouncer.is_pending());

        debouncer.input_changed("what");
        assert!(debouncer.is_pending());

        debouncer.input_changed("");
        assert!(!debouncer.is_pending());
    }
}
