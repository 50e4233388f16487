use anyhow::{Context, Result};
use parrot::audio::{AudioSink, CaptureAvailability, DeviceLock, NullSink};
use parrot::client::{ChatClient, SuggestionsClient};
use parrot::integration::{ClientConfig, SuggestionDebouncer, TurnOutcome, TurnPipeline};
use parrot::messages::{PendingSubmission, Utterance};
use parrot::render::render_markdown;
use parrot::session::{NotificationLevel, PromptTemplate, SessionAction, SessionState};
use parrot::utils::CaptureChannels;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CONFIG_ENV: &str = "PARROT_CONFIG";

const HELP: &str = "\
Type a message and press enter. Commands:
  /suggest <text>   fetch completions for <text>
  /pick <n>         append suggestion n to the input
  /send             send the input as it stands
  /template <n>     start from a canned prompt (1-4)
  /think            toggle reasoning display
  /html             render the last answer as HTML
  /stop             stop playback
  /clear            forget the conversation
  /stats            latency summary
  /quit";

fn load_config() -> Result<ClientConfig> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV).ok());

    let config = match path {
        Some(path) => ClientConfig::load(&path).with_context(|| format!("loading {}", path))?,
        None => ClientConfig::default(),
    };
    let config = config.with_env_overrides()?;
    config.validate()?;
    Ok(config)
}

fn open_sink(config: &ClientConfig) -> Arc<dyn AudioSink> {
    #[cfg(feature = "audio-io")]
    if config.enable_audio_output {
        match parrot::audio::RodioSink::new() {
            Ok(sink) => return Arc::new(sink),
            Err(e) => warn!("Audio output disabled: {}", e),
        }
    }
    #[cfg(not(feature = "audio-io"))]
    let _ = config;

    Arc::new(NullSink)
}

/// Keeps the microphone stream alive for the session.
#[cfg(feature = "audio-io")]
struct Microphone {
    _input: parrot::audio::AudioInput,
}

#[cfg(feature = "audio-io")]
fn start_capture(
    config: &ClientConfig,
    lock: DeviceLock,
    sink: Arc<dyn AudioSink>,
    channels: CaptureChannels,
) -> (
    Option<Microphone>,
    CaptureAvailability,
    tokio::sync::mpsc::UnboundedReceiver<Utterance>,
) {
    use parrot::audio::{open_gate, run_capture, AudioInput, StreamResampler};

    let CaptureChannels {
        raw_audio_tx,
        raw_audio_rx,
        utterance_tx,
        utterance_rx,
    } = channels;

    let (gate, availability) = open_gate(config.capture.clone(), lock);
    let Some(gate) = gate else {
        return (None, availability, utterance_rx);
    };

    let mut input = match AudioInput::new() {
        Ok(input) => input,
        Err(e) => {
            return (None, CaptureAvailability::Unavailable(e.to_string()), utterance_rx);
        }
    };

    let resampler = match StreamResampler::new(input.sample_rate(), config.capture.sample_rate) {
        Ok(resampler) => resampler,
        Err(e) => {
            return (None, CaptureAvailability::Unavailable(e.to_string()), utterance_rx);
        }
    };

    if let Err(e) = input.start(raw_audio_tx) {
        return (None, CaptureAvailability::Unavailable(e.to_string()), utterance_rx);
    }

    let gate = gate.with_playback(sink);
    let spawned = std::thread::Builder::new()
        .name("parrot-capture".into())
        .spawn(move || run_capture(gate, resampler, raw_audio_rx, utterance_tx));
    if let Err(e) = spawned {
        return (None, CaptureAvailability::Unavailable(e.to_string()), utterance_rx);
    }

    (Some(Microphone { _input: input }), availability, utterance_rx)
}

fn print_notifications(state: &mut SessionState) {
    for note in state.take_notifications() {
        match note.level {
            NotificationLevel::Error => eprintln!("! {}", note.message),
            NotificationLevel::Info => eprintln!("i {}", note.message),
        }
    }
}

fn print_outcome(state: &SessionState, outcome: &TurnOutcome) {
    if let TurnOutcome::Streamed { committed: false, .. } = outcome {
        println!("parrot> (no answer)");
        return;
    }
    let Some(turn) = state.history.last_assistant() else {
        return;
    };

    if let TurnOutcome::Spoken { transcript, .. } = outcome {
        println!("you> {}", transcript);
    }
    if state.show_thinking {
        if let Some(thinking) = &turn.thinking {
            println!("(thinking) {}", thinking);
        }
    }
    match turn.latency_ms {
        Some(ms) => println!("parrot> {}  [{}ms]", turn.content, ms),
        None => println!("parrot> {}", turn.content),
    }
}

async fn submit(pipeline: &mut TurnPipeline, state: &mut SessionState, submission: PendingSubmission) {
    match pipeline.run_turn(state, submission).await {
        Ok(outcome) => print_outcome(state, &outcome),
        Err(e) => warn!("Turn not completed: {}", e),
    }
    print_notifications(state);
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parrot=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting Parrot");

    let config = load_config()?;
    info!("Endpoint: {} ({:?})", config.endpoint, config.mode);

    let lock = DeviceLock::new();
    let sink = open_sink(&config);
    let mut state = SessionState::new();

    let client = ChatClient::new(config.endpoint.clone(), config.request_timeout())?
        .with_mode(config.mode);
    let mut pipeline = TurnPipeline::new(client, Arc::clone(&sink), lock.clone())
        .with_playback_format(config.playback);

    let suggestions = SuggestionsClient::new(
        config.suggestions_endpoint.clone(),
        config.request_timeout(),
    )?;
    let (mut debouncer, mut suggestion_rx) =
        SuggestionDebouncer::new(suggestions, config.suggestion_debounce());

    let channels = CaptureChannels::default();

    #[cfg(feature = "audio-io")]
    let (_microphone, availability, mut utterance_rx) = if config.enable_audio_input {
        start_capture(&config, lock.clone(), Arc::clone(&sink), channels)
    } else {
        (
            None,
            CaptureAvailability::Unavailable("disabled in configuration".into()),
            channels.utterance_rx,
        )
    };

    #[cfg(not(feature = "audio-io"))]
    let (availability, mut utterance_rx) = (
        CaptureAvailability::Unavailable("built without audio support".into()),
        channels.utterance_rx,
    );
    // Keeps the utterance channel open when capture never started
    #[cfg(not(feature = "audio-io"))]
    let _utterance_tx = channels.utterance_tx;

    state.apply(SessionAction::CaptureAvailabilityChanged(availability));
    print_notifications(&mut state);

    println!("{}", HELP);
    if state.capture.is_available() {
        println!("Listening. Speak any time.");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim().to_string();

                match line.split_once(' ').unwrap_or((line.as_str(), "")) {
                    ("/quit", _) => break,
                    ("/think", _) => {
                        state.apply(SessionAction::ToggleThinking);
                        println!("Reasoning display {}", if state.show_thinking { "on" } else { "off" });
                    }
                    ("/clear", _) => {
                        state.apply(SessionAction::ClearHistory);
                        println!("Conversation cleared");
                    }
                    ("/stats", _) => println!("{}", pipeline.latency().summary()),
                    ("/stop", _) => sink.stop(),
                    ("/html", _) => match state.history.last_assistant() {
                        Some(turn) => println!("{}", render_markdown(&turn.content)),
                        None => println!("Nothing to render yet"),
                    },
                    ("/template", n) => match n.trim().parse::<usize>().ok().and_then(|n| PromptTemplate::ALL.get(n.wrapping_sub(1))) {
                        Some(template) => {
                            state.apply(SessionAction::ApplyTemplate(*template));
                            println!("input> {}", state.input_text);
                        }
                        None => {
                            for (i, template) in PromptTemplate::ALL.iter().enumerate() {
                                println!("  {}. {}", i + 1, template.label());
                            }
                        }
                    },
                    ("/suggest", text) => {
                        state.apply(SessionAction::InputChanged(text.to_string()));
                        debouncer.input_changed(text);
                    }
                    ("/pick", n) => {
                        let picked = n.trim().parse::<usize>().ok()
                            .and_then(|n| state.suggestions.get(n.wrapping_sub(1)).cloned());
                        match picked {
                            Some(suggestion) => {
                                debouncer.cancel();
                                state.apply(SessionAction::SuggestionAccepted(suggestion));
                                println!("input> {}", state.input_text);
                            }
                            None => println!("No such suggestion"),
                        }
                    }
                    ("/send", _) => {
                        debouncer.cancel();
                        let text = state.input_text.clone();
                        submit(&mut pipeline, &mut state, PendingSubmission::Text(text)).await;
                    }
                    ("", _) => {}
                    _ => {
                        // Template prefixes complete into the typed text
                        let text = if state.input_text.ends_with(' ') && !state.is_pending {
                            format!("{}{}", state.input_text, line)
                        } else {
                            line.clone()
                        };
                        debouncer.cancel();
                        state.apply(SessionAction::InputChanged(text.clone()));
                        submit(&mut pipeline, &mut state, PendingSubmission::Text(text)).await;
                    }
                }
            }
            Some(utterance) = utterance_rx.recv() => {
                info!("Submitting {:.1}s utterance", utterance.duration_seconds());
                submit(&mut pipeline, &mut state, PendingSubmission::Audio(utterance)).await;
            }
            Some(action) = suggestion_rx.recv() => {
                state.apply(action);
                for (i, suggestion) in state.suggestions.iter().enumerate() {
                    println!("  {}. {}", i + 1, suggestion);
                }
            }
        }
    }

    sink.stop();
    info!("Goodbye");
    Ok(())
}
