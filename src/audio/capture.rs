//! Voice-activity-gated utterance capture
//!
//! Frames are scored one at a time. Speech begins on the first frame at or
//! above the positive threshold and ends once enough consecutive frames fall
//! below the negative threshold. Short bursts are dropped as misfires.

use crate::audio::buffer::FrameRing;
use crate::audio::device::{DeviceLock, RecordingGrant};
use crate::audio::output::AudioSink;
use crate::audio::resampler::StreamResampler;
use crate::audio::vad::{SpeechScorer, VoiceActivityDetector};
use crate::audio::wav::encode_wav;
use crate::messages::Utterance;
use crate::Result;
use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

/// Tuning for speech segmentation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Rate the detector runs at (8000 or 16000)
    pub sample_rate: u32,
    pub positive_threshold: f32,
    pub negative_threshold: f32,
    /// Speech frames needed for an utterance to count
    pub min_speech_frames: usize,
    /// Quiet frames that end an utterance
    pub redemption_frames: usize,
    /// Frames kept from before speech onset
    pub pre_speech_pad_frames: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            positive_threshold: 0.6,
            negative_threshold: 0.45,
            min_speech_frames: 4,
            redemption_frames: 8,
            pre_speech_pad_frames: 1,
        }
    }
}

impl CaptureSettings {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(0.0..=1.0).contains(&self.positive_threshold)
            || !(0.0..=1.0).contains(&self.negative_threshold)
        {
            return Err("VAD thresholds must be within 0.0..=1.0".to_string());
        }
        if self.negative_threshold > self.positive_threshold {
            return Err("negative_threshold must not exceed positive_threshold".to_string());
        }
        if self.redemption_frames == 0 {
            return Err("redemption_frames must be at least 1".to_string());
        }
        crate::audio::vad::frame_size_for(self.sample_rate).map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// Whether voice input can be used
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureAvailability {
    Loading,
    Available,
    Unavailable(String),
}

impl CaptureAvailability {
    pub fn is_available(&self) -> bool {
        matches!(self, CaptureAvailability::Available)
    }
}

/// What the gate observed while consuming samples
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    SpeechStarted,
    /// Speech ended with enough voiced frames
    Utterance(Utterance),
    /// Speech ended too soon to count
    Misfire,
}

pub struct CaptureGate<S: SpeechScorer> {
    scorer: S,
    settings: CaptureSettings,
    frame_size: usize,
    lock: DeviceLock,
    playback: Option<Arc<dyn AudioSink>>,

    /// Samples not yet forming a full frame
    partial: Vec<f32>,
    pre_speech: FrameRing,
    speech: Vec<f32>,
    speaking: bool,
    speech_frames: usize,
    quiet_frames: usize,
}

impl<S: SpeechScorer> CaptureGate<S> {
    pub fn new(scorer: S, settings: CaptureSettings, lock: DeviceLock) -> Self {
        let frame_size = scorer.frame_size();
        let pre_speech = FrameRing::new(settings.pre_speech_pad_frames);

        Self {
            scorer,
            settings,
            frame_size,
            lock,
            playback: None,
            partial: Vec::with_capacity(frame_size),
            pre_speech,
            speech: Vec::new(),
            speaking: false,
            speech_frames: 0,
            quiet_frames: 0,
        }
    }

    /// Sink to silence when speech starts
    pub fn with_playback(mut self, sink: Arc<dyn AudioSink>) -> Self {
        self.playback = Some(sink);
        self
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    /// Consume mono samples at the detector rate.
    pub fn push_samples(&mut self, samples: &[f32]) -> Result<Vec<CaptureEvent>> {
        let mut events = Vec::new();
        self.partial.extend_from_slice(samples);

        while self.partial.len() >= self.frame_size {
            let frame: Vec<f32> = self.partial.drain(..self.frame_size).collect();
            if let Some(event) = self.process_frame(&frame)? {
                events.push(event);
            }
        }

        Ok(events)
    }

    fn process_frame(&mut self, frame: &[f32]) -> Result<Option<CaptureEvent>> {
        let probability = self.scorer.score(frame);

        if !self.speaking {
            if probability >= self.settings.positive_threshold {
                return self.start_speech(frame).map(Some);
            }
            self.pre_speech.push(frame);
            return Ok(None);
        }

        self.speech.extend_from_slice(frame);

        if probability >= self.settings.positive_threshold {
            self.speech_frames += 1;
            self.quiet_frames = 0;
        } else if probability < self.settings.negative_threshold {
            self.quiet_frames += 1;
            if self.quiet_frames >= self.settings.redemption_frames {
                return self.end_speech().map(Some);
            }
        }

        Ok(None)
    }

    fn start_speech(&mut self, frame: &[f32]) -> Result<CaptureEvent> {
        if self.lock.begin_recording()? == RecordingGrant::PreemptedPlayback {
            if let Some(sink) = &self.playback {
                info!("Speech started during playback, stopping playback");
                sink.stop();
            }
        }

        self.speaking = true;
        self.speech = self.pre_speech.drain_samples();
        self.speech.extend_from_slice(frame);
        self.speech_frames = 1;
        self.quiet_frames = 0;

        debug!("Speech started");
        Ok(CaptureEvent::SpeechStarted)
    }

    fn end_speech(&mut self) -> Result<CaptureEvent> {
        self.speaking = false;
        self.scorer.reset();
        self.lock.finish_recording();

        let samples = std::mem::take(&mut self.speech);
        let speech_frames = std::mem::replace(&mut self.speech_frames, 0);
        self.quiet_frames = 0;

        if speech_frames < self.settings.min_speech_frames {
            debug!("Misfire: {} speech frames", speech_frames);
            return Ok(CaptureEvent::Misfire);
        }

        let wav = encode_wav(&samples, self.settings.sample_rate, 1)?;
        let utterance = Utterance {
            wav,
            sample_rate: self.settings.sample_rate,
            sample_count: samples.len(),
        };

        info!("Utterance captured: {:.2}s", utterance.duration_seconds());
        Ok(CaptureEvent::Utterance(utterance))
    }
}

/// Load the voice-activity model and build a gate around it.
///
/// Failure leaves voice input unavailable; text input still works.
pub fn open_gate(
    settings: CaptureSettings,
    lock: DeviceLock,
) -> (Option<CaptureGate<VoiceActivityDetector>>, CaptureAvailability) {
    match VoiceActivityDetector::new(settings.sample_rate) {
        Ok(vad) => (
            Some(CaptureGate::new(vad, settings, lock)),
            CaptureAvailability::Available,
        ),
        Err(e) => {
            warn!("Speech detection unavailable: {}", e);
            (None, CaptureAvailability::Unavailable(e.to_string()))
        }
    }
}

/// Feed microphone blocks through the resampler and gate until the
/// microphone channel closes or nobody listens for utterances.
pub fn run_capture<S: SpeechScorer>(
    mut gate: CaptureGate<S>,
    mut resampler: StreamResampler,
    raw_audio: Receiver<Vec<f32>>,
    utterances: UnboundedSender<Utterance>,
) {
    info!(
        "Capture running: {} Hz -> {} Hz",
        resampler.input_rate(),
        resampler.output_rate()
    );

    while let Ok(block) = raw_audio.recv() {
        let samples = match resampler.push(&block) {
            Ok(samples) => samples,
            Err(e) => {
                error!("Resampling failed: {}", e);
                resampler.reset();
                continue;
            }
        };

        let events = match gate.push_samples(&samples) {
            Ok(events) => events,
            Err(e) => {
                warn!("Capture error: {}", e);
                continue;
            }
        };

        for event in events {
            if let CaptureEvent::Utterance(utterance) = event {
                if utterances.send(utterance).is_err() {
                    debug!("Utterance receiver dropped, stopping capture");
                    return;
                }
            }
        }
    }

    debug!("Microphone channel closed, stopping capture");
}
